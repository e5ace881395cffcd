//! The polling cycle controller.
//!
//! One cycle is fetch → annotate distances → compare against the last feed
//! → compute the seen-id delta → apply → render → notify. At most one
//! cycle runs at a time per controller; a trigger that arrives while a
//! cycle is in flight is dropped, not queued. The fetch runs without any
//! lock held, and everything a cycle changes is applied under the session
//! lock in one step, so two cycles' side effects never interleave.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alert::{compute_delta, Notification, Notifier};
use crate::config::{ConfigError, Settings};
use crate::geo_distance::{distance_km, finite_or_none};
use crate::ingest::usgs::{FeedSource, FetchError};
use crate::logging::{log_cycle_summary, log_fetch_failure};
use crate::model::{EarthquakeEvent, TargetConfig};
use crate::render::{MapScene, NearbyList, ViewSink};

// ---------------------------------------------------------------------------
// Triggers and outcomes
// ---------------------------------------------------------------------------

/// Why a cycle was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First load at startup.
    Initial,
    /// Periodic timer.
    Scheduled,
    /// The user asked for a refresh.
    Manual,
    /// Settings were replaced.
    SettingsChanged,
}

impl Trigger {
    /// Forced cycles apply the feed even when it is identical to the last one.
    pub fn is_forced(self) -> bool {
        !matches!(self, Trigger::Scheduled)
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing was done.
    Skipped,
    /// The fetch failed; stored data and seen ids are untouched.
    Failed(FetchError),
    /// The feed matched the previous one and the cycle was not forced.
    Unchanged,
    Updated {
        total: usize,
        nearby: usize,
        notified: usize,
    },
}

impl CycleOutcome {
    /// Short text for a transient status line.
    pub fn status_message(&self) -> String {
        match self {
            CycleOutcome::Skipped => "Update already in progress.".to_string(),
            CycleOutcome::Failed(_) => "Could not fetch earthquake data!".to_string(),
            CycleOutcome::Unchanged => "Data is up to date.".to_string(),
            CycleOutcome::Updated { total, .. } => format!("Data updated. Total: {total}."),
        }
    }

    /// Logs the status text. Failures go out at warn so a failed cycle is
    /// visible at the default level whatever its classification.
    pub fn log_status(&self) {
        let status = self.status_message();
        match self {
            CycleOutcome::Failed(e) => warn!(%status, error = %e, "cycle failed"),
            CycleOutcome::Skipped => debug!(%status, "cycle skipped"),
            _ => info!(%status, "cycle finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Settings together with a counter bumped on every replacement, so a
/// cycle can tell whether the stored distances were computed with the
/// current target.
#[derive(Debug, Clone)]
pub struct SettingsState {
    pub settings: Settings,
    pub generation: u64,
}

/// State carried from one cycle to the next. Only the controller writes it.
#[derive(Debug, Default)]
struct PollSession {
    /// The feed exactly as fetched, for the unchanged-data check.
    last_feed: Vec<EarthquakeEvent>,
    /// `last_feed` with distances annotated.
    events: Vec<EarthquakeEvent>,
    seen_ids: HashSet<String>,
    completed_cycles: u64,
    applied_generation: Option<u64>,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller<S> {
    source: S,
    notifier: Box<dyn Notifier>,
    view: Box<dyn ViewSink>,
    settings: watch::Sender<SettingsState>,
    session: Mutex<PollSession>,
    in_flight: AtomicBool,
}

impl<S: FeedSource> Controller<S> {
    pub fn new(
        source: S,
        notifier: impl Notifier,
        view: impl ViewSink,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let (tx, _rx) = watch::channel(SettingsState { settings, generation: 0 });
        Ok(Self {
            source,
            notifier: Box::new(notifier),
            view: Box::new(view),
            settings: tx,
            session: Mutex::new(PollSession::default()),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings.borrow().settings.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsState> {
        self.settings.subscribe()
    }

    /// Replaces the settings wholesale. The next cycle re-annotates the
    /// stored feed even if the feed itself has not changed.
    ///
    /// Invalid settings are rejected and the current ones stay in effect.
    pub fn apply_settings(&self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.settings.send_modify(|state| {
            state.settings = settings;
            state.generation += 1;
        });
        info!("settings applied");
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The stored, distance-annotated events of the last applied cycle.
    pub async fn events(&self) -> Vec<EarthquakeEvent> {
        self.session.lock().await.events.clone()
    }

    pub async fn seen_ids(&self) -> HashSet<String> {
        self.session.lock().await.seen_ids.clone()
    }

    pub async fn completed_cycles(&self) -> u64 {
        self.session.lock().await.completed_cycles
    }

    /// The nearby list for the stored events under the current settings.
    pub async fn nearby(&self) -> NearbyList {
        let target = self.settings.borrow().settings.target_config();
        NearbyList::build(&self.session.lock().await.events, &target)
    }

    /// Runs one polling cycle.
    pub async fn poll(&self, trigger: Trigger) -> CycleOutcome {
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            debug!(?trigger, "cycle already in flight; trigger dropped");
            return CycleOutcome::Skipped;
        };
        info!(?trigger, "checking for earthquakes");

        let snapshot = self.settings.borrow().clone();

        let fetched = match self.source.fetch().await {
            Ok(events) => events,
            Err(e) => {
                log_fetch_failure(self.source.source_url(), &e);
                return CycleOutcome::Failed(e);
            }
        };

        let mut session = self.session.lock().await;

        let settings_stale = session.applied_generation != Some(snapshot.generation);
        if !trigger.is_forced() && !settings_stale && fetched == session.last_feed {
            info!("no change in earthquake data");
            return CycleOutcome::Unchanged;
        }

        let settings = &snapshot.settings;
        let target = settings.target_config();
        let events = annotate(fetched.clone(), &target);
        let delta = compute_delta(&session.seen_ids, &events, target.min_magnitude);
        let first_cycle = session.completed_cycles == 0;

        session.seen_ids = delta.updated_ids;
        session.last_feed = fetched;
        session.events = events;
        session.completed_cycles += 1;
        session.applied_generation = Some(snapshot.generation);

        let nearby = NearbyList::build(&session.events, &target);
        let map = MapScene::build(&nearby, &target);
        self.view.render(&nearby, &map);

        let mut notified = 0;
        if !first_cycle && settings.alerts.notifications_enabled {
            let sound = settings.notification_sound();
            for event in &delta.newly_significant {
                self.notifier.notify(Notification::for_event(event, sound.clone()));
                notified += 1;
            }
        } else if !delta.newly_significant.is_empty() {
            debug!(
                count = delta.newly_significant.len(),
                first_cycle,
                "notifications suppressed"
            );
        }

        let total = session.events.len();
        log_cycle_summary(total, nearby.len(), notified);

        CycleOutcome::Updated {
            total,
            nearby: nearby.len(),
            notified,
        }
    }
}

/// Sets `distance_km` on every event, once, against `target`.
fn annotate(mut events: Vec<EarthquakeEvent>, target: &TargetConfig) -> Vec<EarthquakeEvent> {
    let origin = Some(target.point());
    for event in &mut events {
        let km = distance_km(origin, event.location.map(|l| l.lat_lon()));
        event.distance_km = finite_or_none(km);
    }
    events
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Requests the scheduler accepts besides its own timer.
#[derive(Debug)]
pub enum Command {
    Refresh,
    Apply(Box<Settings>),
    Shutdown,
}

/// Drives `controller` until `Command::Shutdown` or until every command
/// sender is dropped.
///
/// Runs the initial load right away, then polls every
/// `check_interval_min` minutes. Each cycle is spawned as its own task so
/// a trigger arriving mid-cycle reaches the single-flight guard and is
/// dropped there.
pub async fn run<S: FeedSource>(controller: Arc<Controller<S>>, mut commands: mpsc::Receiver<Command>) {
    let mut settings_rx = controller.subscribe();
    let mut period = settings_rx.borrow_and_update().settings.check_interval();

    spawn_cycle(&controller, Trigger::Initial);
    let mut ticker = make_ticker(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => spawn_cycle(&controller, Trigger::Scheduled),
            command = commands.recv() => match command {
                Some(Command::Refresh) => spawn_cycle(&controller, Trigger::Manual),
                Some(Command::Apply(settings)) => {
                    if let Err(e) = controller.apply_settings(*settings) {
                        warn!(error = %e, "settings rejected");
                    }
                }
                Some(Command::Shutdown) | None => {
                    info!("scheduler stopping");
                    break;
                }
            },
            changed = settings_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let new_period = settings_rx.borrow_and_update().settings.check_interval();
                if new_period != period {
                    period = new_period;
                    ticker = make_ticker(period);
                }
                spawn_cycle(&controller, Trigger::SettingsChanged);
            }
        }
    }
}

fn make_ticker(period: std::time::Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(minutes = period.as_secs() / 60, "polling timer started");
    ticker
}

fn spawn_cycle<S: FeedSource>(controller: &Arc<Controller<S>>, trigger: Trigger) {
    let controller = Arc::clone(controller);
    tokio::spawn(async move {
        controller.poll(trigger).await.log_status();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::alert::ChannelNotifier;
    use crate::ingest::usgs::HttpFeed;
    use crate::logging::CapturedLogs;
    use crate::model::Location;

    /// Returns scripted responses in order; repeats the last one forever.
    struct ScriptedFeed {
        responses: StdMutex<VecDeque<Result<Vec<EarthquakeEvent>, FetchError>>>,
        last: StdMutex<Vec<EarthquakeEvent>>,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<Result<Vec<EarthquakeEvent>, FetchError>>) -> Self {
            Self {
                responses: StdMutex::new(responses.into()),
                last: StdMutex::new(Vec::new()),
            }
        }
    }

    impl FeedSource for ScriptedFeed {
        async fn fetch(&self) -> Result<Vec<EarthquakeEvent>, FetchError> {
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Ok(events)) => {
                    *self.last.lock().unwrap() = events.clone();
                    Ok(events)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }
    }

    /// Blocks inside `fetch` until released.
    struct GatedFeed {
        started: Arc<Notify>,
        release: Arc<Notify>,
        events: Vec<EarthquakeEvent>,
    }

    impl FeedSource for GatedFeed {
        async fn fetch(&self) -> Result<Vec<EarthquakeEvent>, FetchError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(self.events.clone())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingView(Arc<StdMutex<Vec<NearbyList>>>);

    impl ViewSink for RecordingView {
        fn render(&self, nearby: &NearbyList, _map: &MapScene) {
            self.0.lock().unwrap().push(nearby.clone());
        }
    }

    fn quake(id: &str, magnitude: f64, latitude: f64, longitude: f64) -> EarthquakeEvent {
        EarthquakeEvent {
            id: id.to_string(),
            magnitude,
            place: format!("near {id}"),
            occurred_at: None,
            location: Some(Location { latitude, longitude, depth_km: 10.0 }),
            distance_km: None,
        }
    }

    /// ~10 km south of the default target.
    fn close(id: &str, magnitude: f64) -> EarthquakeEvent {
        quake(id, magnitude, 40.9182, 28.9784)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn test_first_cycle_never_notifies() {
        let feed = ScriptedFeed::new(vec![Ok(vec![close("a", 4.0), close("b", 5.0)])]);
        let (notifier, mut rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        let outcome = c.poll(Trigger::Initial).await;
        assert!(matches!(outcome, CycleOutcome::Updated { total: 2, nearby: 2, notified: 0 }), "{outcome:?}");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(c.seen_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_new_event_on_later_cycle_notifies() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![close("a", 4.0)]),
            Ok(vec![close("a", 4.0), close("b", 3.5)]),
        ]);
        let (notifier, mut rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        c.poll(Trigger::Initial).await;
        let outcome = c.poll(Trigger::Scheduled).await;

        assert!(matches!(outcome, CycleOutcome::Updated { notified: 1, .. }), "{outcome:?}");
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_id, "b");
    }

    #[tokio::test]
    async fn test_notifications_disabled() {
        let feed = ScriptedFeed::new(vec![Ok(vec![]), Ok(vec![close("a", 6.0)])]);
        let (notifier, mut rx) = ChannelNotifier::new();
        let mut settings = Settings::default();
        settings.alerts.notifications_enabled = false;
        let c = Controller::new(feed, notifier, RecordingView::default(), settings).unwrap();

        c.poll(Trigger::Initial).await;
        c.poll(Trigger::Scheduled).await;
        assert!(drain(&mut rx).is_empty());
        assert!(c.seen_ids().await.contains("a"), "ids are tracked even when muted");
    }

    #[tokio::test]
    async fn test_unchanged_feed_short_circuits() {
        let feed = ScriptedFeed::new(vec![Ok(vec![close("a", 4.0)])]);
        let view = RecordingView::default();
        let (notifier, mut rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, view.clone(), Settings::default()).unwrap();

        c.poll(Trigger::Initial).await;
        let events_before = c.events().await;
        let ids_before = c.seen_ids().await;

        let outcome = c.poll(Trigger::Scheduled).await;
        assert!(matches!(outcome, CycleOutcome::Unchanged), "{outcome:?}");
        assert_eq!(c.events().await, events_before);
        assert_eq!(c.seen_ids().await, ids_before);
        assert_eq!(c.completed_cycles().await, 1);
        assert_eq!(view.0.lock().unwrap().len(), 1, "no re-render");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_manual_refresh_is_forced() {
        let feed = ScriptedFeed::new(vec![Ok(vec![close("a", 4.0)])]);
        let view = RecordingView::default();
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, view.clone(), Settings::default()).unwrap();

        c.poll(Trigger::Initial).await;
        let outcome = c.poll(Trigger::Manual).await;
        assert!(matches!(outcome, CycleOutcome::Updated { .. }), "{outcome:?}");
        assert_eq!(view.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_session_intact() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![close("a", 4.0)]),
            Err(FetchError::Timeout),
            Err(FetchError::Format("missing field `features`".into())),
        ]);
        let (notifier, mut rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        c.poll(Trigger::Initial).await;
        let events_before = c.events().await;

        for _ in 0..2 {
            let outcome = c.poll(Trigger::Manual).await;
            assert!(matches!(outcome, CycleOutcome::Failed(_)), "{outcome:?}");
            assert_eq!(outcome.status_message(), "Could not fetch earthquake data!");
        }
        assert_eq!(c.events().await, events_before);
        assert_eq!(c.completed_cycles().await, 1);
        assert!(!c.is_polling(), "flight flag released after failure");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_failure_before_first_success_keeps_first_cycle_guard() {
        let feed = ScriptedFeed::new(vec![Err(FetchError::Timeout), Ok(vec![close("a", 4.0)])]);
        let (notifier, mut rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        c.poll(Trigger::Initial).await;
        c.poll(Trigger::Scheduled).await;
        assert!(drain(&mut rx).is_empty(), "first successful cycle is still silent");
        assert_eq!(c.completed_cycles().await, 1);
    }

    #[tokio::test]
    async fn test_trigger_while_in_flight_is_dropped() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let feed = GatedFeed {
            started: started.clone(),
            release: release.clone(),
            events: vec![close("a", 4.0)],
        };
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Arc::new(Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap());

        let first = tokio::spawn({
            let c = c.clone();
            async move { c.poll(Trigger::Initial).await }
        });
        started.notified().await;
        assert!(c.is_polling());

        let second = c.poll(Trigger::Manual).await;
        assert!(matches!(second, CycleOutcome::Skipped), "{second:?}");

        release.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, CycleOutcome::Updated { .. }), "{first:?}");
        assert_eq!(c.completed_cycles().await, 1);
        assert!(!c.is_polling());
    }

    #[tokio::test]
    async fn test_settings_change_reannotates_unchanged_feed() {
        // ~80 km south of the default target.
        let feed = ScriptedFeed::new(vec![Ok(vec![quake("a", 4.0, 40.2882, 28.9784)])]);
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        c.poll(Trigger::Initial).await;
        assert_eq!(c.nearby().await.len(), 1);

        let mut narrow = Settings::default();
        narrow.target.radius_km = 50;
        c.apply_settings(narrow).unwrap();

        // Even a scheduled cycle must not short-circuit on stale settings.
        let outcome = c.poll(Trigger::Scheduled).await;
        assert!(matches!(outcome, CycleOutcome::Updated { nearby: 0, .. }), "{outcome:?}");
        assert!(c.nearby().await.is_empty());
    }

    #[tokio::test]
    async fn test_distance_is_annotated_once_per_cycle() {
        let mut no_location = close("b", 4.0);
        no_location.location = None;
        let feed = ScriptedFeed::new(vec![Ok(vec![close("a", 4.0), no_location])]);
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        c.poll(Trigger::Initial).await;
        let events = c.events().await;
        let d = events[0].distance_km.expect("distance annotated");
        assert!((9.0..11.0).contains(&d), "got {d}");
        assert_eq!(events[1].distance_km, None);
    }

    #[tokio::test]
    async fn test_status_messages() {
        assert_eq!(CycleOutcome::Unchanged.status_message(), "Data is up to date.");
        assert_eq!(
            CycleOutcome::Updated { total: 42, nearby: 1, notified: 0 }.status_message(),
            "Data updated. Total: 42."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_initial_and_periodic_cycles() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![close("a", 4.0)]),
            Ok(vec![close("a", 4.0), close("b", 4.5)]),
        ]);
        let (notifier, mut rx) = ChannelNotifier::new();
        let c = Arc::new(Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap());
        let (tx, commands) = mpsc::channel(8);
        let scheduler = tokio::spawn(run(c.clone(), commands));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(c.completed_cycles().await, 1, "initial load");

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(c.completed_cycles().await, 2, "one scheduled cycle");
        assert_eq!(drain(&mut rx).len(), 1);

        tx.send(Command::Shutdown).await.unwrap();
        scheduler.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_applies_settings_with_forced_cycle() {
        let feed = ScriptedFeed::new(vec![Ok(vec![close("a", 4.0)])]);
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Arc::new(Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap());
        let (tx, commands) = mpsc::channel(8);
        let scheduler = tokio::spawn(run(c.clone(), commands));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut settings = Settings::default();
        settings.alerts.min_magnitude = 5.0;
        settings.polling.check_interval_min = 1;
        tx.send(Command::Apply(Box::new(settings))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(c.settings().alerts.min_magnitude, 5.0);
        assert_eq!(c.completed_cycles().await, 2, "settings change forces a cycle");
        assert!(c.nearby().await.is_empty());

        tx.send(Command::Refresh).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(c.completed_cycles().await, 3, "manual refresh is forced");

        drop(tx);
        scheduler.await.unwrap();
    }

    fn zero_interval() -> Settings {
        let mut settings = Settings::default();
        settings.polling.check_interval_min = 0;
        settings
    }

    #[tokio::test]
    async fn test_failed_cycle_is_reported_at_default_level() {
        let (logs, _guard) = CapturedLogs::install();
        let feed = ScriptedFeed::new(vec![Err(FetchError::Timeout)]);
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        let outcome = c.poll(Trigger::Scheduled).await;
        outcome.log_status();

        let out = logs.contents();
        println!("{out}");
        assert!(out.contains("feed fetch failed"), "{out}");
        assert!(out.contains("WARN"), "{out}");
        assert!(out.contains("Could not fetch earthquake data!"), "{out}");
    }

    #[tokio::test]
    async fn test_fetch_failure_log_names_feed_url() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/all_day.geojson")
            .with_status(503)
            .create_async()
            .await;
        let url = format!("{}/all_day.geojson", server.url());

        let (logs, _guard) = CapturedLogs::install();
        let (notifier, _rx) = ChannelNotifier::new();
        let feed = HttpFeed::new(url.clone()).unwrap();
        let c = Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap();

        let outcome = c.poll(Trigger::Initial).await;
        assert!(matches!(outcome, CycleOutcome::Failed(FetchError::HttpStatus(503))), "{outcome:?}");

        let out = logs.contents();
        let failure_line = out
            .lines()
            .find(|line| line.contains("feed fetch failed"))
            .unwrap_or_else(|| panic!("no failure line in {out}"));
        assert!(failure_line.contains(&url), "{failure_line}");
    }

    #[test]
    fn test_new_rejects_invalid_settings() {
        let (notifier, _rx) = ChannelNotifier::new();
        let result = Controller::new(ScriptedFeed::new(vec![]), notifier, RecordingView::default(), zero_interval());
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_apply_settings_rejects_invalid_and_keeps_current() {
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Controller::new(ScriptedFeed::new(vec![]), notifier, RecordingView::default(), Settings::default()).unwrap();

        let result = c.apply_settings(zero_interval());
        assert!(matches!(result, Err(ConfigError::Invalid { field: _, .. })), "{result:?}");
        assert_eq!(c.settings(), Settings::default());
        assert_eq!(c.subscribe().borrow().generation, 0, "no settings change published");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_survives_invalid_settings_command() {
        let feed = ScriptedFeed::new(vec![Ok(vec![close("a", 4.0)])]);
        let (notifier, _rx) = ChannelNotifier::new();
        let c = Arc::new(Controller::new(feed, notifier, RecordingView::default(), Settings::default()).unwrap());
        let (tx, commands) = mpsc::channel(8);
        let scheduler = tokio::spawn(run(c.clone(), commands));

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(Command::Apply(Box::new(zero_interval()))).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!scheduler.is_finished(), "scheduler still running");
        assert_eq!(c.settings().polling.check_interval_min, 5);
        assert_eq!(c.completed_cycles().await, 1, "rejected settings force no cycle");

        tx.send(Command::Refresh).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(c.completed_cycles().await, 2);

        tx.send(Command::Shutdown).await.unwrap();
        scheduler.await.unwrap();
    }
}
