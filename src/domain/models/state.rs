//! Immutable target state, attribute masks and per-event deltas.
//!
//! `TargetState` is the single source of truth for what the group should
//! be doing. Every mutation produces a new value through a structural
//! update; nothing edits it in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attribute::{AttrMap, AttrValue, Attribute, HvacMode};
use super::command::Actor;
use super::member::{MemberId, MemberSnapshot};

/// Desired configuration of the whole group plus write provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TargetState {
    pub mode: Option<HvacMode>,
    pub temperature: Option<f64>,
    pub target_temp_low: Option<f64>,
    pub target_temp_high: Option<f64>,
    pub humidity: Option<f64>,
    pub fan_mode: Option<String>,
    pub preset_mode: Option<String>,
    pub swing_mode: Option<String>,
    pub swing_horizontal_mode: Option<String>,

    /// Actor that performed the last accepted write.
    pub source: Option<Actor>,
    /// Member that triggered the last accepted write, if any.
    pub member: Option<MemberId>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TargetState {
    /// Return a new state with the given attributes replaced. Unmentioned
    /// attributes and provenance are carried over unchanged.
    pub fn update(&self, changes: &AttrMap) -> Self {
        let mut next = self.clone();
        for (attr, value) in changes {
            next.set(*attr, value);
        }
        next
    }

    /// Return a new state stamped with fresh provenance.
    pub fn with_provenance(mut self, source: Actor, member: Option<MemberId>) -> Self {
        self.source = Some(source);
        self.member = member;
        self.updated_at = Some(Utc::now());
        self
    }

    fn set(&mut self, attr: Attribute, value: &AttrValue) {
        match (attr, value) {
            (Attribute::HvacMode, AttrValue::Mode(mode)) => self.mode = Some(*mode),
            (Attribute::Temperature, AttrValue::Number(n)) => self.temperature = Some(*n),
            (Attribute::TargetTempLow, AttrValue::Number(n)) => self.target_temp_low = Some(*n),
            (Attribute::TargetTempHigh, AttrValue::Number(n)) => {
                self.target_temp_high = Some(*n);
            }
            (Attribute::Humidity, AttrValue::Number(n)) => self.humidity = Some(*n),
            (Attribute::FanMode, AttrValue::Choice(c)) => self.fan_mode = Some(c.clone()),
            (Attribute::PresetMode, AttrValue::Choice(c)) => self.preset_mode = Some(c.clone()),
            (Attribute::SwingMode, AttrValue::Choice(c)) => self.swing_mode = Some(c.clone()),
            (Attribute::SwingHorizontalMode, AttrValue::Choice(c)) => {
                self.swing_horizontal_mode = Some(c.clone());
            }
            // Value shape does not fit the attribute; drop it.
            _ => {}
        }
    }

    /// Current value of the given attribute, if set.
    pub fn get(&self, attr: Attribute) -> Option<AttrValue> {
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

    /// Project the set attributes allowed by the filter into a map.
    pub fn project(&self, filter: &AttrFilter) -> AttrMap {
        Attribute::ALL
            .iter()
            .filter(|attr| filter.allows(**attr))
            .filter_map(|attr| self.get(*attr).map(|value| (*attr, value)))
            .collect()
    }

    /// All set attributes as a map, without provenance.
    pub fn to_map(&self) -> AttrMap {
        self.project(&AttrFilter::all())
    }

    /// True when no attribute has an opinion yet.
    pub fn is_empty(&self) -> bool {
        Attribute::ALL.iter().all(|attr| self.get(*attr).is_none())
    }
}

/// Boolean mask over the attribute set, restricting what an actor may
/// read or write. Built once per actor from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrFilter {
    allowed: std::collections::BTreeSet<Attribute>,
}

impl AttrFilter {
    /// Mask allowing every attribute.
    pub fn all() -> Self {
        Self { allowed: Attribute::ALL.into_iter().collect() }
    }

    /// Mask allowing only the listed attributes.
    pub fn from_attrs(attrs: &[Attribute]) -> Self {
        Self { allowed: attrs.iter().copied().collect() }
    }

    pub fn allows(&self, attr: Attribute) -> bool {
        self.allowed.contains(&attr)
    }

    /// Keep only the allowed entries of a map.
    pub fn mask(&self, map: &AttrMap) -> AttrMap {
        map.iter()
            .filter(|(attr, _)| self.allows(**attr))
            .map(|(attr, value)| (*attr, value.clone()))
            .collect()
    }
}

/// Ephemeral per-event deviation of one member from the target state.
/// Computed once per incoming event and consumed by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDelta {
    pub member: MemberId,
    pub changes: AttrMap,
}

impl StateDelta {
    /// Diff a member snapshot against the target. Attributes where either
    /// side has no opinion are skipped; numeric attributes must deviate
    /// beyond `tolerance` to count.
    pub fn compute(
        member: MemberId,
        snapshot: &MemberSnapshot,
        target: &TargetState,
        tolerance: f64,
    ) -> Self {
        let mut changes = AttrMap::new();
        for attr in Attribute::ALL {
            let Some(target_value) = target.get(attr) else { continue };
            let Some(member_value) = snapshot.value(attr) else { continue };
            if member_value.matches(&target_value, tolerance) {
                continue;
            }
            changes.insert(attr, member_value);
        }
        Self { member, changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heat_at(temperature: f64) -> TargetState {
        TargetState::default().update(&AttrMap::from([
            (Attribute::HvacMode, AttrValue::Mode(HvacMode::Heat)),
            (Attribute::Temperature, AttrValue::Number(temperature)),
        ]))
    }

    #[test]
    fn test_update_is_structural() {
        let initial = heat_at(21.0);
        let next = initial.update(&AttrMap::from([(
            Attribute::Temperature,
            AttrValue::Number(22.0),
        )]));
        assert_eq!(initial.temperature, Some(21.0));
        assert_eq!(next.temperature, Some(22.0));
        assert_eq!(next.mode, Some(HvacMode::Heat));
    }

    #[test]
    fn test_update_ignores_mismatched_value_shape() {
        let state = heat_at(21.0)
            .update(&AttrMap::from([(Attribute::Temperature, AttrValue::choice("warm"))]));
        assert_eq!(state.temperature, Some(21.0));
    }

    #[test]
    fn test_provenance_survives_attribute_update() {
        let state = heat_at(21.0).with_provenance(Actor::Command, Some("trv_a".into()));
        let next = state.update(&AttrMap::from([(
            Attribute::Temperature,
            AttrValue::Number(19.0),
        )]));
        assert_eq!(next.source, Some(Actor::Command));
        assert_eq!(next.member, Some("trv_a".into()));
    }

    #[test]
    fn test_project_masks_and_skips_unset() {
        let state = heat_at(21.0);
        let filter = AttrFilter::from_attrs(&[Attribute::Temperature, Attribute::FanMode]);
        let projected = state.project(&filter);
        assert_eq!(projected.len(), 1);
        assert_eq!(
            projected.get(&Attribute::Temperature),
            Some(&AttrValue::Number(21.0))
        );
    }

    #[test]
    fn test_is_empty_ignores_provenance() {
        let state = TargetState::default().with_provenance(Actor::Restore, None);
        assert!(state.is_empty());
        assert!(!heat_at(20.0).is_empty());
    }

    #[test]
    fn test_delta_within_tolerance_is_empty() {
        let target = heat_at(21.0);
        let snapshot = MemberSnapshot::default()
            .with_mode(HvacMode::Heat)
            .with_temperature(20.95);
        let delta = StateDelta::compute("trv_a".into(), &snapshot, &target, 0.1);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_delta_reports_deviation() {
        let target = heat_at(21.0);
        let snapshot = MemberSnapshot::default()
            .with_mode(HvacMode::Off)
            .with_temperature(18.0);
        let delta = StateDelta::compute("trv_a".into(), &snapshot, &target, 0.1);
        assert_eq!(
            delta.changes.get(&Attribute::HvacMode),
            Some(&AttrValue::Mode(HvacMode::Off))
        );
        assert_eq!(
            delta.changes.get(&Attribute::Temperature),
            Some(&AttrValue::Number(18.0))
        );
    }

    #[test]
    fn test_delta_skips_attributes_without_target_opinion() {
        let target = TargetState::default();
        let snapshot = MemberSnapshot::default().with_mode(HvacMode::Heat);
        let delta = StateDelta::compute("trv_a".into(), &snapshot, &target, 0.1);
        assert!(delta.is_empty());
    }
}
