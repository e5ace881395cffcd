//! Derived views of the stored event collection.
//!
//! Both views are rebuilt from scratch after every applied cycle and read
//! only the stored `distance_km`; nothing here recomputes distances.

use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::model::{EarthquakeEvent, TargetConfig};

/// Magnitude at and above which a map marker is drawn red.
pub const STRONG_MAGNITUDE: f64 = 4.0;

// ---------------------------------------------------------------------------
// Nearby list
// ---------------------------------------------------------------------------

/// One line of the nearby list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub event: EarthquakeEvent,
    /// e.g. `[12:00] M3.5 (~80 km) - 12 km SW of Silivri, Turkey`
    pub line: String,
}

/// Significant events within the radius, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NearbyList {
    pub entries: Vec<ListEntry>,
}

impl NearbyList {
    pub fn build(events: &[EarthquakeEvent], target: &TargetConfig) -> Self {
        let entries = nearby_events(events, target)
            .into_iter()
            .map(|event| ListEntry {
                line: list_line(event),
                event: event.clone(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Events that pass the magnitude and radius filter, sorted ascending by
/// distance. Ties keep feed order.
pub fn nearby_events<'a>(events: &'a [EarthquakeEvent], target: &TargetConfig) -> Vec<&'a EarthquakeEvent> {
    let mut nearby: Vec<_> = events.iter().filter(|e| e.is_nearby(target)).collect();
    nearby.sort_by(|a, b| {
        let da = a.distance_km.unwrap_or(f64::INFINITY);
        let db = b.distance_km.unwrap_or(f64::INFINITY);
        da.total_cmp(&db)
    });
    nearby
}

fn list_line(event: &EarthquakeEvent) -> String {
    let clock = event
        .occurred_at
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let distance = event
        .distance_km
        .map(|d| format!("~{d:.0} km"))
        .unwrap_or_else(|| "N/A".to_string());
    format!("[{clock}] M{:.1} ({distance}) - {}", event.magnitude, event.place)
}

// ---------------------------------------------------------------------------
// Map scene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor {
    Red,
    Orange,
}

impl MarkerColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerColor::Red => "red",
            MarkerColor::Orange => "orange",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub event_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub depth_km: f64,
    pub magnitude: f64,
    pub distance_km: Option<f64>,
    pub place: String,
    pub time: String,
    pub color: MarkerColor,
    /// Marker radius in screen pixels.
    pub size: f64,
}

/// Everything a map widget needs: the target, its radius circle, a zoom
/// level and one marker per nearby event.
#[derive(Debug, Clone, PartialEq)]
pub struct MapScene {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_km: f64,
    pub zoom: u8,
    pub markers: Vec<MapMarker>,
}

impl MapScene {
    pub fn build(nearby: &NearbyList, target: &TargetConfig) -> Self {
        let markers = nearby
            .entries
            .iter()
            .filter_map(|entry| {
                let e = &entry.event;
                let loc = e.location?;
                Some(MapMarker {
                    event_id: e.id.clone(),
                    latitude: loc.latitude,
                    longitude: loc.longitude,
                    depth_km: loc.depth_km,
                    magnitude: e.magnitude,
                    distance_km: e.distance_km,
                    place: e.place.clone(),
                    time: e.time_label(),
                    color: if e.magnitude >= STRONG_MAGNITUDE {
                        MarkerColor::Red
                    } else {
                        MarkerColor::Orange
                    },
                    size: 3.0 + e.magnitude,
                })
            })
            .collect();

        Self {
            center_latitude: target.latitude,
            center_longitude: target.longitude,
            radius_km: target.radius_km,
            zoom: zoom_for_radius(target.radius_km),
            markers,
        }
    }

    /// The scene as a GeoJSON FeatureCollection: the target point first,
    /// then one point per marker.
    pub fn to_geojson(&self) -> Value {
        let mut features = vec![json!({
            "type": "Feature",
            "id": "target",
            "geometry": {
                "type": "Point",
                "coordinates": [self.center_longitude, self.center_latitude],
            },
            "properties": {
                "kind": "target",
                "radius_km": self.radius_km,
                "zoom": self.zoom,
            },
        })];

        features.extend(self.markers.iter().map(|m| {
            json!({
                "type": "Feature",
                "id": m.event_id,
                "geometry": {
                    "type": "Point",
                    "coordinates": [m.longitude, m.latitude, m.depth_km],
                },
                "properties": {
                    "kind": "earthquake",
                    "mag": m.magnitude,
                    "place": m.place,
                    "time": m.time,
                    "distance_km": m.distance_km,
                    "color": m.color.as_str(),
                    "size": m.size,
                },
            })
        }));

        json!({ "type": "FeatureCollection", "features": features })
    }
}

/// Zoom level that keeps the whole radius circle in view.
pub fn zoom_for_radius(radius_km: f64) -> u8 {
    if radius_km < 100.0 {
        9
    } else if radius_km < 300.0 {
        8
    } else if radius_km < 700.0 {
        7
    } else if radius_km < 1500.0 {
        6
    } else {
        5
    }
}

// ---------------------------------------------------------------------------
// Rendering targets
// ---------------------------------------------------------------------------

/// Consumer of the derived views, called once per applied cycle.
pub trait ViewSink: Send + Sync + 'static {
    fn render(&self, nearby: &NearbyList, map: &MapScene);
}

/// Logs the nearby list, and optionally writes the map scene as GeoJSON.
#[derive(Debug, Default, Clone)]
pub struct LogView {
    map_output: Option<PathBuf>,
}

impl LogView {
    pub fn new(map_output: Option<PathBuf>) -> Self {
        Self { map_output }
    }
}

impl ViewSink for LogView {
    fn render(&self, nearby: &NearbyList, map: &MapScene) {
        info!(count = nearby.len(), "nearby earthquakes");
        for entry in &nearby.entries {
            info!("  {}", entry.line);
        }

        if let Some(path) = &self.map_output {
            let write = serde_json::to_string_pretty(&map.to_geojson())
                .map_err(|e| e.to_string())
                .and_then(|text| fs::write(path, text).map_err(|e| e.to_string()));
            match write {
                Ok(()) => debug!(path = %path.display(), markers = map.markers.len(), "map scene written"),
                Err(e) => error!(path = %path.display(), error = %e, "could not write map scene"),
            }
        }
    }
}
