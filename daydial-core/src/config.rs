//! Global daydial configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MINUTES_BEFORE, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_WINDOW_FUTURE_DAYS, DEFAULT_WINDOW_PAST_DAYS,
};
use crate::error::{DayDialError, DayDialResult};
use crate::sync::SyncSettings;

static DEFAULT_DATA_DIR: &str = "~/.local/share/daydial";
static DEFAULT_CALENDAR_DIR: &str = "~/calendar";

const ENV_PREFIX: &str = "DAYDIAL";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_calendar_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CALENDAR_DIR)
}

fn default_window_past_days() -> i64 {
    DEFAULT_WINDOW_PAST_DAYS
}

fn default_window_future_days() -> i64 {
    DEFAULT_WINDOW_FUTURE_DAYS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_minutes_before() -> Vec<u32> {
    DEFAULT_MINUTES_BEFORE.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_calendar: Option<String>,

    #[serde(default)]
    pub selected_calendars: Vec<String>,

    #[serde(default = "default_window_past_days")]
    pub window_past_days: i64,

    #[serde(default = "default_window_future_days")]
    pub window_future_days: i64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            enabled: false,
            target_calendar: None,
            selected_calendars: Vec::new(),
            window_past_days: DEFAULT_WINDOW_PAST_DAYS,
            window_future_days: DEFAULT_WINDOW_FUTURE_DAYS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Reminders given to imported tasks.
    #[serde(default = "default_minutes_before")]
    pub default_minutes_before: Vec<u32>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        NotificationsConfig {
            default_minutes_before: default_minutes_before(),
        }
    }
}

/// Global configuration at ~/.config/daydial/config.toml
///
/// Every key can be overridden from the environment, e.g.
/// `DAYDIAL_TIME_ZONE=Europe/Berlin` or `DAYDIAL_SYNC__ENABLED=true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDialConfig {
    /// Local events, pending reminders and widget snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where the calendars synced with daydial live.
    #[serde(default = "default_calendar_dir")]
    pub calendar_dir: PathBuf,

    /// IANA zone name. The host zone when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl Default for DayDialConfig {
    fn default() -> Self {
        DayDialConfig {
            data_dir: default_data_dir(),
            calendar_dir: default_calendar_dir(),
            time_zone: None,
            sync: SyncConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl DayDialConfig {
    pub fn config_path() -> DayDialResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DayDialError::Config("Could not determine config directory".into()))?
            .join("daydial");

        Ok(config_dir.join("config.toml"))
    }

    /// Load ~/.config/daydial/config.toml, creating it on first run.
    pub fn load() -> DayDialResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(path: &Path, env: Environment) -> DayDialResult<Self> {
        let env = env
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("sync.selected_calendars")
            .with_list_parse_key("notifications.default_minutes_before");

        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(env)
            .build()
            .map_err(|e| DayDialError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DayDialError::Config(e.to_string()))
    }

    /// Save to ~/.config/daydial/config.toml. Comments in the file are lost.
    pub fn save(&self) -> DayDialResult<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> DayDialResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DayDialError::Config(e.to_string()))?;

        crate::utils::write_atomic(path, &content)
            .map_err(|e| DayDialError::Config(format!("Could not write config file: {e}")))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> DayDialResult<()> {
        let contents = format!(
            "\
# daydial configuration

# Where local events, reminders and widget snapshots are kept:
# data_dir = \"{DEFAULT_DATA_DIR}\"

# Where your calendars live:
# calendar_dir = \"{DEFAULT_CALENDAR_DIR}\"

# Time zone for event days (defaults to the system zone):
# time_zone = \"Europe/Berlin\"

[sync]
# enabled = true
# target_calendar = \"personal\"
# selected_calendars = [\"personal\", \"holidays\"]
# window_past_days = {DEFAULT_WINDOW_PAST_DAYS}
# window_future_days = {DEFAULT_WINDOW_FUTURE_DAYS}
# poll_interval_secs = {DEFAULT_POLL_INTERVAL_SECS}

[notifications]
# default_minutes_before = [10]
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DayDialError::Config(format!("Could not create config directory: {e}")))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DayDialError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        expand(&self.data_dir)
    }

    pub fn calendar_path(&self) -> PathBuf {
        expand(&self.calendar_dir)
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_path().join("events")
    }

    pub fn reminders_path(&self) -> PathBuf {
        self.data_path().join("reminders.json")
    }

    pub fn widget_path(&self) -> PathBuf {
        self.data_path().join("widget")
    }

    /// The configured zone, or `host` when none is set.
    pub fn tz(&self, host: Tz) -> DayDialResult<Tz> {
        match &self.time_zone {
            Some(name) => name
                .parse()
                .map_err(|_| DayDialError::Config(format!("Unknown time zone '{name}'"))),
            None => Ok(host),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs.max(1))
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            calendar_sync_enabled: self.sync.enabled,
            target_calendar_id: self.sync.target_calendar.clone(),
            selected_calendar_ids: self.sync.selected_calendars.clone(),
            window_past_days: self.sync.window_past_days,
            window_future_days: self.sync.window_future_days,
        }
    }

    pub fn set_sync_settings(&mut self, settings: &SyncSettings) {
        self.sync.enabled = settings.calendar_sync_enabled;
        self.sync.target_calendar = settings.target_calendar_id.clone();
        self.sync.selected_calendars = settings.selected_calendar_ids.clone();
        self.sync.window_past_days = settings.window_past_days;
        self.sync.window_future_days = settings.window_future_days;
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
