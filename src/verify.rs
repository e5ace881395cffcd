//! Feed Verification Module
//!
//! One-shot probe of the earthquake feed: is it reachable, does it parse,
//! and how many of its features carry the fields the monitor relies on.
//!
//! Run this before pointing the daemon at a new network or proxy.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::usgs::{HttpFeed, ParseStats};
use crate::logging::{classify_fetch_failure, FailureType};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub url: String,
    pub status: VerificationStatus,
    pub events_kept: usize,
    pub stats: ParseStats,
    pub failure_type: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Feed Verification
// ============================================================================

pub async fn verify_feed(feed: &HttpFeed) -> VerificationReport {
    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        url: feed.url().to_string(),
        status: VerificationStatus::Failed,
        events_kept: 0,
        stats: ParseStats::default(),
        failure_type: None,
        error_message: None,
    };

    match feed.fetch_parsed().await {
        Ok(parsed) => {
            report.events_kept = parsed.events.len();
            report.status = status_for(&parsed.stats);
            report.stats = parsed.stats;
        }
        Err(e) => {
            report.failure_type = Some(classify_fetch_failure(&e).to_string());
            report.error_message = Some(e.to_string());
        }
    }

    report
}

/// `Success` when every feature was usable, `PartialSuccess` when some
/// were dropped or incomplete.
fn status_for(stats: &ParseStats) -> VerificationStatus {
    if stats.incomplete() == 0 {
        VerificationStatus::Success
    } else {
        VerificationStatus::PartialSuccess
    }
}

impl VerificationReport {
    /// `true` when the feed is reachable but misbehaving; `--verify` exits
    /// non-zero on this.
    pub fn is_unexpected_failure(&self) -> bool {
        self.failure_type.as_deref() == Some(FailureType::Unexpected.to_string().as_str())
    }
}
