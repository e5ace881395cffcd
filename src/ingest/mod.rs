//! Feed ingestion.
//!
//! Submodules:
//! - `usgs`: fetches and normalizes the USGS earthquake GeoJSON feed.

pub mod usgs;
