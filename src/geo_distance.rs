//! Great-circle distance between the target and an epicenter.
//!
//! Uses the WGS84 ellipsoidal geodesic (Karney's algorithm, as implemented
//! by `geo::GeodesicDistance`), the same solution geographiclib produces.
//! No approximation is introduced, so events sitting right at the filter
//! radius are classified exactly as a reference geodesic would.

use geo::{GeodesicDistance, Point};
use tracing::debug;

use crate::model::LatLon;

/// Returned when either endpoint is missing or the distance cannot be
/// computed. Callers must never store it; see `finite_or_none`.
pub const DISTANCE_UNKNOWN: f64 = f64::INFINITY;

/// Geodesic distance in kilometers between `a` and `b`.
///
/// Returns [`DISTANCE_UNKNOWN`] if either point is absent, if a coordinate
/// is non-finite or outside the valid range, or if the computation itself
/// does not produce a finite value.
pub fn distance_km(a: Option<LatLon>, b: Option<LatLon>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return DISTANCE_UNKNOWN;
    };

    match geodesic_km(a, b) {
        Ok(km) => km,
        Err(reason) => {
            debug!(?a, ?b, %reason, "distance computation failed");
            DISTANCE_UNKNOWN
        }
    }
}

/// Converts a `distance_km` result into the optional form stored on events.
pub fn finite_or_none(km: f64) -> Option<f64> {
    (km.is_finite() && km >= 0.0).then_some(km)
}

fn geodesic_km(a: LatLon, b: LatLon) -> Result<f64, String> {
    validate(a)?;
    validate(b)?;

    let meters = Point::new(a.longitude, a.latitude)
        .geodesic_distance(&Point::new(b.longitude, b.latitude));

    if meters.is_finite() {
        Ok(meters / 1000.0)
    } else {
        Err(format!("non-finite result {meters}"))
    }
}

fn validate(p: LatLon) -> Result<(), String> {
    if !p.latitude.is_finite() || !p.longitude.is_finite() {
        return Err(format!("non-finite coordinate ({}, {})", p.latitude, p.longitude));
    }
    if !(-90.0..=90.0).contains(&p.latitude) {
        return Err(format!("latitude {} out of range", p.latitude));
    }
    if !(-180.0..=180.0).contains(&p.longitude) {
        return Err(format!("longitude {} out of range", p.longitude));
    }
    Ok(())
}
