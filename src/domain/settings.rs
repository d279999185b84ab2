use crate::domain::address::BluetoothAddress;
use crate::domain::error::ConfigError;
use crate::domain::presence::PresenceConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_presence".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Presence tuning as stored on disk. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSettings {
    #[serde(default = "default_enter_rssi")]
    pub enter_rssi_threshold: f64,
    #[serde(default = "default_exit_rssi")]
    pub exit_rssi_threshold: f64,
    #[serde(default = "default_exit_debounce_secs")]
    pub exit_debounce_secs: f64,
    #[serde(default = "default_seen_timeout_secs")]
    pub seen_timeout_secs: f64,
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    #[serde(default = "default_true")]
    pub disappearance_exit: bool,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            enter_rssi_threshold: default_enter_rssi(),
            exit_rssi_threshold: default_exit_rssi(),
            exit_debounce_secs: default_exit_debounce_secs(),
            seen_timeout_secs: default_seen_timeout_secs(),
            smoothing_alpha: default_smoothing_alpha(),
            disappearance_exit: true,
        }
    }
}

// Reference tuning: enter when close, exit only when clearly far
fn default_enter_rssi() -> f64 {
    -85.0
}
fn default_exit_rssi() -> f64 {
    -88.0
}
fn default_exit_debounce_secs() -> f64 {
    10.0
}
fn default_seen_timeout_secs() -> f64 {
    2.0 // scan jitter tolerance
}
fn default_smoothing_alpha() -> f64 {
    0.3
}

impl PresenceSettings {
    /// Convert to a validated [`PresenceConfig`].
    pub fn to_config(&self) -> Result<PresenceConfig, ConfigError> {
        let config = PresenceConfig {
            enter_rssi_threshold: self.enter_rssi_threshold,
            exit_rssi_threshold: self.exit_rssi_threshold,
            exit_debounce: seconds("exit_debounce_secs", self.exit_debounce_secs)?,
            seen_timeout: seconds("seen_timeout_secs", self.seen_timeout_secs)?,
            smoothing_alpha: self.smoothing_alpha,
            disappearance_exit: self.disappearance_exit,
        };
        config.validate()?;
        Ok(config)
    }
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { name, value })
}

/// What to do when presence changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSettings {
    /// Only log the transition
    #[default]
    Log,
    /// Power the display on and off
    Display,
    /// Run an external program; each list is argv with the program first
    Command {
        on: Vec<String>,
        off: Vec<String>,
        /// A program still running after this long is killed
        #[serde(default = "default_command_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_command_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Address of the tracked phone
    #[serde(default)]
    pub target_address: Option<BluetoothAddress>,

    #[serde(default)]
    pub presence: PresenceSettings,

    // Poll loop cadence
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,

    #[serde(default)]
    pub action: ActionSettings,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_address: None,
            presence: PresenceSettings::default(),
            poll_interval_ms: default_poll_interval_ms(),
            scan_window_ms: default_scan_window_ms(),
            action: ActionSettings::default(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    200
}
fn default_scan_window_ms() -> u64 {
    1000
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// A missing file yields defaults; a file that exists but does not parse
    /// is an error.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = match path {
            Some(path) => path,
            None => Self::default_settings_path()?,
        };
        let settings = if settings_path.exists() {
            Self::load_from_file(&settings_path)?
        } else {
            Settings::default()
        };

        Ok(Self {
            settings,
            settings_path,
        })
    }

    pub fn default_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BlePresence");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.settings_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
