//! USGS Earthquake Hazards Program GeoJSON feed client
//!
//! Retrieves the rolling "all earthquakes, past day" summary feed and
//! normalizes each GeoJSON feature into an `EarthquakeEvent`.
//!
//! Feed documentation: https://earthquake.usgs.gov/earthquakes/feed/v1.0/geojson.php

use std::future::Future;
use std::time::Duration;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{EarthquakeEvent, Location};

pub const FEED_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson";

/// Upper bound on a whole request, including reading the body.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(25);

// ============================================================================
// Errors
// ============================================================================

/// Errors that can arise when fetching or decoding the feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request did not complete within the bounded wait.
    #[error("feed request timed out")]
    Timeout,
    /// DNS, TLS, refused connection or any other connectivity failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    /// The body is not JSON or lacks the `features` array.
    #[error("format error: {0}")]
    Format(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Format(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Format(e.to_string())
    }
}

// ============================================================================
// Feed source seam
// ============================================================================

/// Anything that can produce the current list of earthquakes.
///
/// The polling controller only talks to this trait, so tests can script
/// feed responses without a network.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Vec<EarthquakeEvent>, FetchError>> + Send;

    /// Where the feed comes from, for log lines. `None` for in-process sources.
    fn source_url(&self) -> Option<&str> {
        None
    }
}

/// Fetches the feed over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(url, FETCH_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches and parses the feed, keeping the parse statistics.
    pub async fn fetch_parsed(&self) -> Result<ParsedFeed, FetchError> {
        info!(url = %self.url, "fetching earthquake feed");

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/geo+json, application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let body = response.text().await?;
        let parsed = parse_feed(&body)?;

        info!(
            total = parsed.stats.total_features,
            kept = parsed.events.len(),
            "received earthquake feed"
        );
        if parsed.stats.incomplete() > 0 {
            warn!(
                without_id = parsed.stats.dropped_without_id,
                without_time = parsed.stats.missing_time,
                without_location = parsed.stats.missing_location,
                "some features were incomplete"
            );
        }

        Ok(parsed)
    }
}

impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<Vec<EarthquakeEvent>, FetchError> {
        self.fetch_parsed().await.map(|parsed| parsed.events)
    }

    fn source_url(&self) -> Option<&str> {
        Some(&self.url)
    }
}

// ============================================================================
// GeoJSON Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeedDocument {
    features: Vec<FeedFeature>,
}

#[derive(Debug, Deserialize)]
struct FeedFeature {
    id: Option<String>,
    properties: Option<FeedProperties>,
    geometry: Option<FeedGeometry>,
}

#[derive(Debug, Default, Deserialize)]
struct FeedProperties {
    mag: Option<f64>,
    place: Option<String>,
    time: Option<f64>, // epoch milliseconds
}

#[derive(Debug, Deserialize)]
struct FeedGeometry {
    coordinates: Option<Vec<Option<f64>>>, // [lon, lat, depth]
}

/// Counts of how well the feed's features mapped onto `EarthquakeEvent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub total_features: usize,
    pub dropped_without_id: usize,
    pub missing_magnitude: usize,
    pub missing_time: usize,
    pub missing_location: usize,
}

impl ParseStats {
    /// Features that were dropped or kept with a missing field.
    pub fn incomplete(&self) -> usize {
        self.dropped_without_id + self.missing_time + self.missing_location
    }
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub events: Vec<EarthquakeEvent>,
    pub stats: ParseStats,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a feed body into normalized events, preserving feed order.
///
/// Features without an id are dropped. A missing magnitude becomes 0.0 and
/// a missing or unrepresentable timestamp leaves `occurred_at` unset; in
/// both cases the event is kept.
pub fn parse_feed(body: &str) -> Result<ParsedFeed, FetchError> {
    let document: FeedDocument = serde_json::from_str(body)?;

    let mut stats = ParseStats {
        total_features: document.features.len(),
        ..ParseStats::default()
    };
    let mut events = Vec::with_capacity(document.features.len());

    for feature in document.features {
        let Some(id) = feature.id.filter(|id| !id.is_empty()) else {
            stats.dropped_without_id += 1;
            continue;
        };
        let props = feature.properties.unwrap_or_default();

        if props.mag.is_none() {
            stats.missing_magnitude += 1;
        }
        let occurred_at = props
            .time
            .filter(|ms| ms.is_finite())
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64));
        if occurred_at.is_none() {
            stats.missing_time += 1;
        }
        let location = feature
            .geometry
            .and_then(|g| g.coordinates)
            .and_then(|c| parse_location(&c));
        if location.is_none() {
            stats.missing_location += 1;
        }

        events.push(EarthquakeEvent {
            id,
            magnitude: normalize_magnitude(props.mag),
            place: props.place.unwrap_or_default(),
            occurred_at,
            location,
            distance_km: None,
        });
    }

    debug!(?stats, "parsed earthquake feed");
    Ok(ParsedFeed { events, stats })
}

/// Missing, non-finite and negative magnitudes all normalize to 0.0.
pub fn normalize_magnitude(mag: Option<f64>) -> f64 {
    match mag {
        Some(m) if m.is_finite() && m > 0.0 => m,
        _ => 0.0,
    }
}

fn parse_location(coords: &[Option<f64>]) -> Option<Location> {
    match coords {
        [Some(longitude), Some(latitude), rest @ ..] => Some(Location {
            latitude: *latitude,
            longitude: *longitude,
            depth_km: rest.first().copied().flatten().unwrap_or(0.0),
        }),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
