//! Core data types for the earthquake monitoring service.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O; the only logic is the small set of accessors the
//! filter and render passes share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Epicenter position and hypocenter depth of an earthquake.
///
/// The USGS feed orders coordinates as `[longitude, latitude, depth]`;
/// the ingest layer reorders them into named fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
}

impl Location {
    pub fn lat_lon(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }
}

/// A plain latitude/longitude pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A single earthquake as reported by the feed, after normalization.
///
/// Corresponds to one entry of the `features[]` array of the USGS GeoJSON
/// summary feed. A fresh collection is built on every polling cycle; the
/// only field written after ingest is `distance_km`, set once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeEvent {
    /// USGS event id, e.g. "us7000abcd". Never empty.
    pub id: String,
    /// Finite and non-negative; 0.0 when the feed omitted it.
    pub magnitude: f64,
    pub place: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub location: Option<Location>,
    /// Kilometers from the configured target. Absent when the location is
    /// missing or the distance could not be computed.
    pub distance_km: Option<f64>,
}

impl EarthquakeEvent {
    /// `occurred_at` as "2024-05-01 12:00:00 UTC", or "N/A".
    pub fn time_label(&self) -> String {
        self.occurred_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn is_significant(&self, min_magnitude: f64) -> bool {
        self.magnitude >= min_magnitude
    }

    /// `true` if the event is significant and its stored distance lies
    /// within `radius_km`. Events without a distance never qualify.
    pub fn is_nearby(&self, target: &TargetConfig) -> bool {
        self.is_significant(target.min_magnitude)
            && self.distance_km.is_some_and(|d| d <= target.radius_km)
    }
}

// ---------------------------------------------------------------------------
// Target configuration
// ---------------------------------------------------------------------------

/// The reference point and thresholds a polling cycle filters against.
///
/// Derived from `config::Settings`; replaced wholesale when settings change
/// and never mutated while a cycle runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
    /// Inclusive lower bound for both display and notification.
    pub min_magnitude: f64,
}

impl TargetConfig {
    pub fn point(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
