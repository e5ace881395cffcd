//! Notification messages for newly significant earthquakes.
//!
//! Delivery is fire-and-forget: a `Notifier` gets one call per event and
//! reports nothing back to the controller. Lost notifications are never
//! retried.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model::EarthquakeEvent;

/// What a desktop notification would show.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event_id: String,
    pub title: String,
    pub body: String,
    /// Sound to play alongside the notification, if configured.
    pub sound: Option<PathBuf>,
}

impl Notification {
    /// Builds the message for one event.
    ///
    /// Title: `Earthquake alert: M4.2`.
    /// Body: `<place> (~80 km from target)` then the event time on the
    /// next line. The distance part is left out when it is unknown.
    pub fn for_event(event: &EarthquakeEvent, sound: Option<PathBuf>) -> Self {
        let place = if event.place.is_empty() {
            "Unknown location"
        } else {
            event.place.as_str()
        };
        let distance = event
            .distance_km
            .map(|d| format!(" (~{d:.0} km from target)"))
            .unwrap_or_default();

        Self {
            event_id: event.id.clone(),
            title: format!("Earthquake alert: M{:.1}", event.magnitude),
            body: format!("{place}{distance}\n{}", event.time_label()),
            sound,
        }
    }
}

/// Receives notifications from the polling controller.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log. Used by the headless daemon.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match &n.sound {
            Some(sound) if !sound.exists() => {
                warn!(sound = %sound.display(), "notification sound file not found");
                info!(event = %n.event_id, title = %n.title, body = %n.body, "notification");
            }
            Some(sound) => info!(
                event = %n.event_id,
                title = %n.title,
                body = %n.body,
                sound = %sound.display(),
                "notification"
            ),
            None => info!(event = %n.event_id, title = %n.title, body = %n.body, "notification"),
        }
    }
}

/// Forwards notifications into a channel, for front ends that deliver them
/// on their own thread.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("notification receiver dropped; notification discarded");
        }
    }
}
