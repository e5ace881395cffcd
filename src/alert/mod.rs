//! Alerting: deciding which earthquakes are new and telling the user.
//!
//! Submodules:
//! - `tracker`: seen-id bookkeeping and "newly significant" detection.
//! - `notify`: notification text and the `Notifier` delivery seam.

pub mod notify;
pub mod tracker;

pub use notify::{ChannelNotifier, LogNotifier, Notification, Notifier};
pub use tracker::{compute_delta, Delta};
