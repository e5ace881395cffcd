//! Seen-id tracking and "newly significant" detection.
//!
//! The tracker is a pure function over the previous cycle's id set. The
//! polling controller owns the set and replaces it with `updated_ids` after
//! every successful cycle; the set only ever grows while the process runs.

use std::collections::HashSet;

use crate::model::EarthquakeEvent;

/// Result of comparing one cycle's events against the ids seen so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    /// Events at or above the minimum magnitude whose id was not seen in
    /// any previous cycle, in feed order.
    pub newly_significant: Vec<EarthquakeEvent>,
    /// `previous_ids` plus every non-empty id of the current events.
    pub updated_ids: HashSet<String>,
}

/// Computes which of `current` are newly significant relative to
/// `previous_ids`.
///
/// An id repeated within `current` yields at most one entry in
/// `newly_significant`. Events with an empty id are ignored entirely.
pub fn compute_delta(
    previous_ids: &HashSet<String>,
    current: &[EarthquakeEvent],
    min_magnitude: f64,
) -> Delta {
    let mut updated_ids = previous_ids.clone();
    let mut newly_significant: Vec<EarthquakeEvent> = Vec::new();
    let mut emitted: HashSet<&str> = HashSet::new();

    for event in current.iter().filter(|e| !e.id.is_empty()) {
        updated_ids.insert(event.id.clone());

        let unseen = !previous_ids.contains(&event.id);
        if unseen && event.is_significant(min_magnitude) && emitted.insert(event.id.as_str()) {
            newly_significant.push(event.clone());
        }
    }

    Delta { newly_significant, updated_ids }
}
