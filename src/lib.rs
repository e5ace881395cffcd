//! Earthquake monitoring service.
//!
//! Polls the USGS earthquake feed, measures each event's distance from a
//! configured target, and raises notifications for newly observed
//! significant earthquakes nearby.

pub mod alert;
pub mod config;
pub mod geo_distance;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod poller;
pub mod render;
pub mod verify;
