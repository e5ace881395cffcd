//! User settings, stored as a TOML file.
//!
//! Every section and field has a default, so a partial file (or none at
//! all) yields a usable configuration. Values are range-checked on load
//! and before save.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::model::TargetConfig;

pub const DEFAULT_SETTINGS_FILE: &str = "quakemon.toml";

pub const MIN_RADIUS_KM: u32 = 10;
/// Roughly half the Earth's circumference; anything larger covers the globe.
pub const MAX_RADIUS_KM: u32 = 20_001;
pub const MIN_CHECK_INTERVAL_MIN: u64 = 1;
pub const MAX_CHECK_INTERVAL_MIN: u64 = 120;
pub const MIN_MAGNITUDE_RANGE: (f64, f64) = (1.0, 9.0);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete application settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub target: TargetSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where to measure distances from, and how far to look.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSettings {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_radius_km")]
    pub radius_km: u32,
}

// Istanbul
fn default_latitude() -> f64 {
    41.0082
}

fn default_longitude() -> f64 {
    28.9784
}

fn default_radius_km() -> u32 {
    150
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            radius_km: default_radius_km(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
    /// Sound file to play with each notification. Empty means none.
    #[serde(default)]
    pub notification_sound: String,
}

fn default_min_magnitude() -> f64 {
    3.0
}

fn default_notifications_enabled() -> bool {
    true
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            min_magnitude: default_min_magnitude(),
            notifications_enabled: default_notifications_enabled(),
            notification_sound: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_check_interval_min")]
    pub check_interval_min: u64,
}

fn default_check_interval_min() -> u64 {
    5
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            check_interval_min: default_check_interval_min(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    #[default]
    DarkBlue,
    DarkOrange,
    LightBlue,
    LightGray,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub theme: Theme,
    /// Where to write the map scene as GeoJSON after each cycle. Empty
    /// disables the file.
    #[serde(default)]
    pub map_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append-only log file in addition to the console. Empty disables it.
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

impl Settings {
    /// Reads and validates a settings file. Does not log, so it can run
    /// before the subscriber is installed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Clears a configured notification sound that does not exist on disk
    /// and returns its path.
    pub fn drop_missing_sound(&mut self) -> Option<PathBuf> {
        let sound = self.notification_sound()?;
        if sound.exists() {
            return None;
        }
        self.alerts.notification_sound.clear();
        Some(sound)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.target;
        if !t.latitude.is_finite() || !(-90.0..=90.0).contains(&t.latitude) {
            return Err(invalid("target.latitude", format!("{} is not in -90..=90", t.latitude)));
        }
        if !t.longitude.is_finite() || !(-180.0..=180.0).contains(&t.longitude) {
            return Err(invalid("target.longitude", format!("{} is not in -180..=180", t.longitude)));
        }
        if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&t.radius_km) {
            return Err(invalid(
                "target.radius_km",
                format!("{} is not in {MIN_RADIUS_KM}..={MAX_RADIUS_KM}", t.radius_km),
            ));
        }

        let (lo, hi) = MIN_MAGNITUDE_RANGE;
        let mag = self.alerts.min_magnitude;
        if !mag.is_finite() || !(lo..=hi).contains(&mag) {
            return Err(invalid("alerts.min_magnitude", format!("{mag} is not in {lo}..={hi}")));
        }

        let interval = self.polling.check_interval_min;
        if !(MIN_CHECK_INTERVAL_MIN..=MAX_CHECK_INTERVAL_MIN).contains(&interval) {
            return Err(invalid(
                "polling.check_interval_min",
                format!("{interval} is not in {MIN_CHECK_INTERVAL_MIN}..={MAX_CHECK_INTERVAL_MIN}"),
            ));
        }
        Ok(())
    }

    pub fn target_config(&self) -> TargetConfig {
        TargetConfig {
            latitude: self.target.latitude,
            longitude: self.target.longitude,
            radius_km: f64::from(self.target.radius_km),
            min_magnitude: self.alerts.min_magnitude,
        }
    }

    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.polling.check_interval_min * 60)
    }

    pub fn notification_sound(&self) -> Option<PathBuf> {
        non_empty_path(&self.alerts.notification_sound)
    }

    pub fn map_output(&self) -> Option<PathBuf> {
        non_empty_path(&self.display.map_output)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        non_empty_path(&self.logging.file)
    }
}

fn non_empty_path(s: &str) -> Option<PathBuf> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
