//! Structured logging for the earthquake monitoring service
//!
//! Sets up `tracing` output to the console and, optionally, to an
//! append-only log file for daemon operation. Also classifies feed
//! failures so that expected hiccups do not drown real problems.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::ingest::usgs::FetchError;

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. When `log_file` is given,
/// every event is also appended to that file without ANSI colors.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quakemon_service={level},quakemon={level}")));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - transient network conditions the next poll will likely ride out
    Expected,
    /// Unexpected failure - the feed is misbehaving or has changed shape
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a feed fetch failure.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        // Slow upstream or a flaky connection; the next tick retries anyway.
        FetchError::Timeout => FailureType::Expected,
        FetchError::Transport(_) => FailureType::Unknown,
        // 5xx is the feed being briefly unavailable, 4xx means the URL broke.
        FetchError::HttpStatus(code) if *code >= 500 => FailureType::Unknown,
        FetchError::HttpStatus(_) => FailureType::Unexpected,
        // Parse errors suggest a feed format change.
        FetchError::Format(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a feed failure with automatic classification.
pub fn log_fetch_failure(url: Option<&str>, err: &FetchError) {
    let failure_type = classify_fetch_failure(err);
    let url = url.unwrap_or("-");

    match failure_type {
        FailureType::Expected => info!(%url, %failure_type, error = %err, "feed fetch failed"),
        FailureType::Unexpected => error!(%url, %failure_type, error = %err, "feed fetch failed"),
        FailureType::Unknown => warn!(%url, %failure_type, error = %err, "feed fetch failed"),
    }
}

// ---------------------------------------------------------------------------
// Cycle Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one applied polling cycle.
pub fn log_cycle_summary(total: usize, nearby: usize, notified: usize) {
    if notified > 0 {
        warn!(total, nearby, notified, "new significant earthquakes near target");
    } else {
        info!(total, nearby, "earthquake data updated");
    }
}

// ---------------------------------------------------------------------------
// Test capture
// ---------------------------------------------------------------------------

/// Collects formatted log output for assertions. Installed per thread, so
/// it only sees events from current-thread test runtimes.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedLogs {
    /// Starts capturing at `quakemon_service=info`, the daemon default.
    pub(crate) fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("quakemon_service=info"))
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
