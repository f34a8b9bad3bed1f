//! Group configuration.
//!
//! Everything is serde-deserializable with per-field defaults so a
//! minimal YAML file (name + members) yields a fully working setup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::attribute::Attribute;
use super::member::{MemberId, SensorId};
use crate::domain::error::ConfigError;

/// Main configuration for one thermostat group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupConfig {
    /// Display name of the group.
    pub name: String,

    /// Controlled members.
    pub members: Vec<MemberId>,

    /// Numeric comparison tolerance for setpoints.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Leave manually switched-off members alone when commanding the rest.
    #[serde(default)]
    pub ignore_off_members: bool,

    /// Setpoint injected alongside an off command so actuators do not
    /// silently fall back to their own default.
    #[serde(default)]
    pub min_temp_when_off: Option<f64>,

    /// How the observed group mode is derived from member modes.
    #[serde(default)]
    pub mode_strategy: ModeStrategy,

    /// Read-side reduction options.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Deviation handling.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Debounce, retry and startup timings.
    #[serde(default)]
    pub timings: TimingConfig,

    /// Window-gated suppression.
    #[serde(default)]
    pub window: WindowConfig,

    /// Schedule integration.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_tolerance() -> f64 {
    0.1
}

impl GroupConfig {
    /// A default configuration for the given members.
    pub fn new(name: impl Into<String>, members: Vec<MemberId>) -> Self {
        Self {
            name: name.into(),
            members,
            tolerance: default_tolerance(),
            ignore_off_members: false,
            min_temp_when_off: None,
            mode_strategy: ModeStrategy::default(),
            aggregation: AggregationConfig::default(),
            sync: SyncConfig::default(),
            timings: TimingConfig::default(),
            window: WindowConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check configuration consistency once at setup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.members.is_empty() {
            return Err(ConfigError::NoMembers);
        }
        let mut seen = std::collections::BTreeSet::new();
        for member in &self.members {
            if !seen.insert(member) {
                return Err(ConfigError::DuplicateMember(member.clone()));
            }
        }
        if self.tolerance <= 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}

/// How the observed group mode is derived from member modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeStrategy {
    /// Off only when every member is off, otherwise the most common
    /// active mode.
    #[default]
    Normal,
    /// Off as soon as any member is off.
    OffPriority,
    /// `Normal` while the target is off or unset, `OffPriority` otherwise.
    Auto,
}

/// Averaging method for numeric read-side reductions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageMethod {
    #[default]
    Mean,
    Median,
    Min,
    Max,
}

/// Rounding applied after averaging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundMethod {
    #[default]
    None,
    Half,
    Integer,
}

/// Read-side reduction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregationConfig {
    #[serde(default)]
    pub setpoint_average: AverageMethod,
    #[serde(default)]
    pub setpoint_round: RoundMethod,
}

/// What to do when a member deviates from the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Observe only.
    #[default]
    Passive,
    /// Push deviating members back to the target.
    Enforce,
    /// Adopt member changes into the target, then propagate.
    Adopt,
}

/// Deviation handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,

    /// Attributes participating in enforcement/adoption.
    #[serde(default = "default_sync_attributes")]
    pub attributes: Vec<Attribute>,
}

fn default_sync_attributes() -> Vec<Attribute> {
    Attribute::ALL.to_vec()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { mode: SyncMode::default(), attributes: default_sync_attributes() }
    }
}

/// Debounce, retry and startup timings, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimingConfig {
    /// Cooldown for coalescing rapid dispatch triggers.
    #[serde(default)]
    pub debounce_ms: u64,

    /// Additional attempts after a failed batch.
    #[serde(default)]
    pub retry_attempts: u32,

    /// Fixed delay between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Grace period after all members first become ready during which
    /// deviation handling stays quiet.
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
}

const fn default_retry_delay_ms() -> u64 {
    1_000
}

const fn default_startup_grace_ms() -> u64 {
    5_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 0,
            retry_attempts: 0,
            retry_delay_ms: default_retry_delay_ms(),
            startup_grace_ms: default_startup_grace_ms(),
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

/// Window-gated suppression configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WindowConfig {
    /// Monitored contact sensors. Empty disables suppression.
    #[serde(default)]
    pub sensors: Vec<SensorId>,

    /// How long a sensor must stay open before members are forced off.
    #[serde(default = "default_open_delay_ms")]
    pub open_delay_ms: u64,

    /// How long a sensor must stay closed before the target is restored.
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
}

const fn default_open_delay_ms() -> u64 {
    15_000
}

const fn default_close_delay_ms() -> u64 {
    30_000
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sensors: Vec::new(),
            open_delay_ms: default_open_delay_ms(),
            close_delay_ms: default_close_delay_ms(),
        }
    }
}

impl WindowConfig {
    pub fn enabled(&self) -> bool {
        !self.sensors.is_empty()
    }

    pub fn open_delay(&self) -> Duration {
        Duration::from_millis(self.open_delay_ms)
    }

    pub fn close_delay(&self) -> Duration {
        Duration::from_millis(self.close_delay_ms)
    }
}

/// Schedule integration configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleConfig {
    /// Periodically reapply the active slot. Zero disables.
    #[serde(default)]
    pub resync_minutes: u64,

    /// How long a user command overrides the schedule. Zero disables.
    #[serde(default)]
    pub override_minutes: u64,

    /// Keep user changes across slot transitions until the override
    /// timer (or a restart) hands control back to the schedule.
    #[serde(default)]
    pub persist_changes: bool,
}

impl ScheduleConfig {
    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_minutes * 60)
    }

    pub fn override_duration(&self) -> Duration {
        Duration::from_secs(self.override_minutes * 60)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated log files. Unset logs to stdout.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), directory: None }
    }
}
