//! Controllable attributes and their values.
//!
//! Every operation the group can order on a member is expressed as an
//! `(Attribute, AttrValue)` pair. Numeric attributes compare with a
//! configurable tolerance, everything else compares exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Operating mode of a thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "heat_cool",
            Self::Auto => "auto",
            Self::Dry => "dry",
            Self::FanOnly => "fan_only",
        }
    }

    /// Canonical ordering used when presenting available modes.
    pub const ORDERED: [Self; 7] = [
        Self::Off,
        Self::Heat,
        Self::Cool,
        Self::HeatCool,
        Self::Auto,
        Self::Dry,
        Self::FanOnly,
    ];
}

impl std::fmt::Display for HvacMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A controllable attribute of the group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    HvacMode,
    Temperature,
    TargetTempLow,
    TargetTempHigh,
    Humidity,
    FanMode,
    PresetMode,
    SwingMode,
    SwingHorizontalMode,
}

impl Attribute {
    /// All controllable attributes.
    pub const ALL: [Self; 9] = [
        Self::HvacMode,
        Self::Temperature,
        Self::TargetTempLow,
        Self::TargetTempHigh,
        Self::Humidity,
        Self::FanMode,
        Self::PresetMode,
        Self::SwingMode,
        Self::SwingHorizontalMode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HvacMode => "hvac_mode",
            Self::Temperature => "temperature",
            Self::TargetTempLow => "target_temp_low",
            Self::TargetTempHigh => "target_temp_high",
            Self::Humidity => "humidity",
            Self::FanMode => "fan_mode",
            Self::PresetMode => "preset_mode",
            Self::SwingMode => "swing_mode",
            Self::SwingHorizontalMode => "swing_horizontal_mode",
        }
    }

    /// Setpoint attributes are meaningless while the group is off.
    pub fn is_setpoint(self) -> bool {
        matches!(
            self,
            Self::Temperature | Self::TargetTempLow | Self::TargetTempHigh | Self::Humidity
        )
    }

    /// Numeric attributes compare with tolerance, all others exactly.
    pub fn is_numeric(self) -> bool {
        self.is_setpoint()
    }

    /// Selector attributes carry a per-member list of supported values.
    pub fn is_selector(self) -> bool {
        matches!(
            self,
            Self::HvacMode
                | Self::FanMode
                | Self::PresetMode
                | Self::SwingMode
                | Self::SwingHorizontalMode
        )
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value of a controllable attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Mode(HvacMode),
    Number(f64),
    Choice(String),
}

impl AttrValue {
    pub fn choice(value: impl Into<String>) -> Self {
        Self::Choice(value.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<HvacMode> {
        match self {
            Self::Mode(m) => Some(*m),
            _ => None,
        }
    }

    /// Tolerance-aware equality: numbers match within `tolerance`,
    /// everything else requires exact equality.
    pub fn matches(&self, other: &Self, tolerance: f64) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => (a - b).abs() < tolerance,
            _ => self == other,
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, Self::Mode(HvacMode::Off))
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mode(m) => write!(f, "{m}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Choice(c) => write!(f, "{c}"),
        }
    }
}

impl From<HvacMode> for AttrValue {
    fn from(mode: HvacMode) -> Self {
        Self::Mode(mode)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Ordered attribute/value mapping used for payloads, deltas and projections.
pub type AttrMap = BTreeMap<Attribute, AttrValue>;
