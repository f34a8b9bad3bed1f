//! Outbound commands, actors and causal batch metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attribute::{AttrMap, AttrValue, Attribute, HvacMode};
use super::member::MemberId;

/// Who is acting on the group. Every target-state write and every
/// dispatched batch is attributed to exactly one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Direct user/API command.
    Command,
    /// Enforcement sync reacting to member deviations.
    Sync,
    /// Window suppression controller.
    Window,
    /// Schedule slot application.
    Schedule,
    /// Startup seeding or snapshot restore.
    Restore,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Sync => "sync",
            Self::Window => "window",
            Self::Schedule => "schedule",
            Self::Restore => "restore",
        }
    }

    /// Whether echoes caused by this actor's batches feed per-attribute
    /// reconciliation. Window batches are deliberate overrides of the
    /// target and must never be folded back into it.
    pub fn issues_trusted_echoes(self) -> bool {
        matches!(self, Self::Command | Self::Sync | Self::Schedule)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One outbound operation. Low and high setpoints always travel together
/// so a device never sees an inverted interim range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    SetHvacMode { mode: HvacMode },
    SetTemperature { temperature: f64 },
    SetTemperatureRange { low: f64, high: f64 },
    SetHumidity { humidity: f64 },
    SetFanMode { fan_mode: String },
    SetPresetMode { preset_mode: String },
    SetSwingMode { swing_mode: String },
    SetSwingHorizontalMode { swing_horizontal_mode: String },
}

impl CommandKind {
    /// Build the command for a single attribute, if the value shape fits.
    /// Range endpoints have no single-attribute command.
    pub fn for_attribute(attr: Attribute, value: &AttrValue) -> Option<Self> {
        match (attr, value) {
            (Attribute::HvacMode, AttrValue::Mode(mode)) => {
                Some(Self::SetHvacMode { mode: *mode })
            }
            (Attribute::Temperature, AttrValue::Number(temperature)) => {
                Some(Self::SetTemperature { temperature: *temperature })
            }
            (Attribute::Humidity, AttrValue::Number(humidity)) => {
                Some(Self::SetHumidity { humidity: *humidity })
            }
            (Attribute::FanMode, AttrValue::Choice(fan_mode)) => {
                Some(Self::SetFanMode { fan_mode: fan_mode.clone() })
            }
            (Attribute::PresetMode, AttrValue::Choice(preset_mode)) => {
                Some(Self::SetPresetMode { preset_mode: preset_mode.clone() })
            }
            (Attribute::SwingMode, AttrValue::Choice(swing_mode)) => {
                Some(Self::SetSwingMode { swing_mode: swing_mode.clone() })
            }
            (Attribute::SwingHorizontalMode, AttrValue::Choice(swing_horizontal_mode)) => {
                Some(Self::SetSwingHorizontalMode {
                    swing_horizontal_mode: swing_horizontal_mode.clone(),
                })
            }
            _ => None,
        }
    }

    /// The attribute/value pairs this command orders.
    pub fn payload(&self) -> AttrMap {
        match self {
            Self::SetHvacMode { mode } => {
                AttrMap::from([(Attribute::HvacMode, AttrValue::Mode(*mode))])
            }
            Self::SetTemperature { temperature } => {
                AttrMap::from([(Attribute::Temperature, AttrValue::Number(*temperature))])
            }
            Self::SetTemperatureRange { low, high } => AttrMap::from([
                (Attribute::TargetTempLow, AttrValue::Number(*low)),
                (Attribute::TargetTempHigh, AttrValue::Number(*high)),
            ]),
            Self::SetHumidity { humidity } => {
                AttrMap::from([(Attribute::Humidity, AttrValue::Number(*humidity))])
            }
            Self::SetFanMode { fan_mode } => {
                AttrMap::from([(Attribute::FanMode, AttrValue::choice(fan_mode.clone()))])
            }
            Self::SetPresetMode { preset_mode } => {
                AttrMap::from([(Attribute::PresetMode, AttrValue::choice(preset_mode.clone()))])
            }
            Self::SetSwingMode { swing_mode } => {
                AttrMap::from([(Attribute::SwingMode, AttrValue::choice(swing_mode.clone()))])
            }
            Self::SetSwingHorizontalMode { swing_horizontal_mode } => AttrMap::from([(
                Attribute::SwingHorizontalMode,
                AttrValue::choice(swing_horizontal_mode.clone()),
            )]),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetHvacMode { .. } => "set_hvac_mode",
            Self::SetTemperature { .. } | Self::SetTemperatureRange { .. } => "set_temperature",
            Self::SetHumidity { .. } => "set_humidity",
            Self::SetFanMode { .. } => "set_fan_mode",
            Self::SetPresetMode { .. } => "set_preset_mode",
            Self::SetSwingMode { .. } => "set_swing_mode",
            Self::SetSwingHorizontalMode { .. } => "set_swing_horizontal_mode",
        }
    }
}

/// An outbound command batch entry: one operation for a set of members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub members: Vec<MemberId>,
}

/// Causal identity of a dispatched batch: dispatch time plus the member
/// that originated the triggering write, if any. Used only to correlate
/// subsequent echoes; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTag {
    pub dispatched_at: DateTime<Utc>,
    pub origin: Option<MemberId>,
    pub actor: Actor,
}

impl BatchTag {
    pub fn new(actor: Actor, origin: Option<MemberId>) -> Self {
        Self { dispatched_at: Utc::now(), origin, actor }
    }
}

/// Typed causal record carried by member events that are reactions to a
/// batch this process issued. `payload` is what the originating command
/// actually ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalContext {
    pub tag: BatchTag,
    pub payload: AttrMap,
}
