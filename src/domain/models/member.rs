//! Member, zone and sensor identities plus the externally supplied
//! member snapshot shape.

use serde::{Deserialize, Serialize};

use super::attribute::{AttrValue, Attribute, HvacMode};

/// Identifier of one controllable device in the group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a zone (area) grouping members and window sensors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a monitored window/contact sensor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Read-only view of one member's current state as reported by the
/// device transport. Supplied by the host adapter, never owned here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemberSnapshot {
    /// Whether the device is currently reachable.
    #[serde(default = "default_available")]
    pub available: bool,
    pub mode: Option<HvacMode>,
    pub temperature: Option<f64>,
    pub target_temp_low: Option<f64>,
    pub target_temp_high: Option<f64>,
    pub humidity: Option<f64>,
    pub fan_mode: Option<String>,
    pub preset_mode: Option<String>,
    pub swing_mode: Option<String>,
    pub swing_horizontal_mode: Option<String>,
    /// Modes the device can be switched into.
    #[serde(default)]
    pub hvac_modes: Vec<HvacMode>,
    #[serde(default)]
    pub fan_modes: Vec<String>,
    #[serde(default)]
    pub preset_modes: Vec<String>,
    #[serde(default)]
    pub swing_modes: Vec<String>,
    #[serde(default)]
    pub swing_horizontal_modes: Vec<String>,
}

const fn default_available() -> bool {
    true
}

impl Default for MemberSnapshot {
    fn default() -> Self {
        Self {
            available: true,
            mode: None,
            temperature: None,
            target_temp_low: None,
            target_temp_high: None,
            humidity: None,
            fan_mode: None,
            preset_mode: None,
            swing_mode: None,
            swing_horizontal_mode: None,
            hvac_modes: Vec::new(),
            fan_modes: Vec::new(),
            preset_modes: Vec::new(),
            swing_modes: Vec::new(),
            swing_horizontal_modes: Vec::new(),
        }
    }
}

impl MemberSnapshot {
    /// Current value of the given attribute, if the device reports one.
    pub fn value(&self, attr: Attribute) -> Option<AttrValue> {
        match attr {
            Attribute::HvacMode => self.mode.map(AttrValue::Mode),
            Attribute::Temperature => self.temperature.map(AttrValue::Number),
            Attribute::TargetTempLow => self.target_temp_low.map(AttrValue::Number),
            Attribute::TargetTempHigh => self.target_temp_high.map(AttrValue::Number),
            Attribute::Humidity => self.humidity.map(AttrValue::Number),
            Attribute::FanMode => self.fan_mode.clone().map(AttrValue::Choice),
            Attribute::PresetMode => self.preset_mode.clone().map(AttrValue::Choice),
            Attribute::SwingMode => self.swing_mode.clone().map(AttrValue::Choice),
            Attribute::SwingHorizontalMode => {
                self.swing_horizontal_mode.clone().map(AttrValue::Choice)
            }
        }
    }

    /// Whether the device can accept the given value for the attribute.
    ///
    /// Selector attributes check the device's supported-value list; numeric
    /// attributes count as supported when the device currently reports them.
    pub fn supports(&self, attr: Attribute, value: &AttrValue) -> bool {
        match attr {
            Attribute::HvacMode => match value {
                AttrValue::Mode(mode) => self.hvac_modes.contains(mode),
                _ => false,
            },
            Attribute::FanMode => Self::supports_choice(&self.fan_modes, value),
            Attribute::PresetMode => Self::supports_choice(&self.preset_modes, value),
            Attribute::SwingMode => Self::supports_choice(&self.swing_modes, value),
            Attribute::SwingHorizontalMode => {
                Self::supports_choice(&self.swing_horizontal_modes, value)
            }
            _ => self.value(attr).is_some(),
        }
    }

    fn supports_choice(options: &[String], value: &AttrValue) -> bool {
        match value {
            AttrValue::Choice(choice) => options.iter().any(|o| o == choice),
            _ => false,
        }
    }

    pub fn is_off(&self) -> bool {
        self.mode == Some(HvacMode::Off)
    }

    pub fn with_mode(mut self, mode: HvacMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_hvac_modes(mut self, modes: &[HvacMode]) -> Self {
        self.hvac_modes = modes.to_vec();
        self
    }
}
