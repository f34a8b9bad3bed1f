//! Read-side reduction of member snapshots.
//!
//! Produces the observed group state and readiness flags the engine
//! consumes: the effective group mode, whether all members have reported
//! in, and an observed attribute map used to seed an empty target from
//! the first fully-observed snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::attribute::{AttrMap, AttrValue, Attribute, HvacMode};
use crate::domain::models::config::{AverageMethod, GroupConfig, ModeStrategy, RoundMethod};
use crate::domain::models::member::MemberSnapshot;
use crate::domain::ports::registry::MemberRegistry;

/// Snapshot of the group as currently observed.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupView {
    /// At least one member is reachable.
    pub available: bool,
    /// Every configured member has a valid snapshot.
    pub all_ready: bool,
    /// Group mode derived from member modes per the configured strategy.
    pub effective_mode: Option<HvacMode>,
    /// Union of the modes members can be switched into.
    pub supported_modes: Vec<HvacMode>,
    /// Observed attribute values, reduced across members.
    pub observed: AttrMap,
}

/// Stateless reducer over the live registry.
pub struct Aggregator {
    config: Arc<GroupConfig>,
    registry: Arc<dyn MemberRegistry>,
}

impl Aggregator {
    pub fn new(config: Arc<GroupConfig>, registry: Arc<dyn MemberRegistry>) -> Self {
        Self { config, registry }
    }

    /// Reduce the current member snapshots into a group view.
    /// `target_mode` feeds the auto mode strategy.
    pub fn view(&self, target_mode: Option<HvacMode>) -> GroupView {
        let snapshots: Vec<MemberSnapshot> = self
            .config
            .members
            .iter()
            .filter_map(|id| self.registry.snapshot(id))
            .filter(|s| s.available)
            .collect();

        let all_ready = snapshots.len() == self.config.members.len();
        let available = !snapshots.is_empty();

        let member_modes: Vec<HvacMode> =
            snapshots.iter().filter_map(|s| s.mode).collect();
        let effective_mode = self.effective_mode(&member_modes, target_mode);

        let mut supported_modes: Vec<HvacMode> = HvacMode::ORDERED
            .into_iter()
            .filter(|mode| snapshots.iter().any(|s| s.hvac_modes.contains(mode)))
            .collect();
        if available && !supported_modes.contains(&HvacMode::Off) {
            supported_modes.insert(0, HvacMode::Off);
        }

        let mut observed = AttrMap::new();
        if let Some(mode) = effective_mode {
            observed.insert(Attribute::HvacMode, AttrValue::Mode(mode));
        }
        for attr in [
            Attribute::Temperature,
            Attribute::TargetTempLow,
            Attribute::TargetTempHigh,
            Attribute::Humidity,
        ] {
            let values: Vec<f64> = snapshots
                .iter()
                .filter_map(|s| s.value(attr).and_then(|v| v.as_number()))
                .collect();
            if let Some(reduced) = self.reduce(&values) {
                observed.insert(attr, AttrValue::Number(reduced));
            }
        }
        for attr in [
            Attribute::FanMode,
            Attribute::PresetMode,
            Attribute::SwingMode,
            Attribute::SwingHorizontalMode,
        ] {
            let values = snapshots.iter().filter_map(|s| selector_value(s, attr));
            if let Some(most_common) = most_frequent(values) {
                observed.insert(attr, AttrValue::Choice(most_common));
            }
        }

        GroupView { available, all_ready, effective_mode, supported_modes, observed }
    }

    fn effective_mode(
        &self,
        member_modes: &[HvacMode],
        target_mode: Option<HvacMode>,
    ) -> Option<HvacMode> {
        if member_modes.is_empty() {
            return None;
        }
        let strategy = match self.config.mode_strategy {
            ModeStrategy::Auto => match target_mode {
                None | Some(HvacMode::Off) => ModeStrategy::Normal,
                Some(_) => ModeStrategy::OffPriority,
            },
            other => other,
        };
        let most_common_active =
            most_frequent(member_modes.iter().copied().filter(|m| *m != HvacMode::Off));
        match strategy {
            ModeStrategy::Normal => {
                if member_modes.iter().all(|m| *m == HvacMode::Off) {
                    Some(HvacMode::Off)
                } else {
                    most_common_active
                }
            }
            ModeStrategy::OffPriority | ModeStrategy::Auto => {
                if member_modes.contains(&HvacMode::Off) {
                    Some(HvacMode::Off)
                } else {
                    most_common_active
                }
            }
        }
    }

    fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let reduced = match self.config.aggregation.setpoint_average {
            AverageMethod::Mean => values.iter().sum::<f64>() / values.len() as f64,
            AverageMethod::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            AverageMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AverageMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(round(reduced, self.config.aggregation.setpoint_round))
    }
}

fn selector_value(snapshot: &MemberSnapshot, attr: Attribute) -> Option<String> {
    match attr {
        Attribute::FanMode => snapshot.fan_mode.clone(),
        Attribute::PresetMode => snapshot.preset_mode.clone(),
        Attribute::SwingMode => snapshot.swing_mode.clone(),
        Attribute::SwingHorizontalMode => snapshot.swing_horizontal_mode.clone(),
        _ => None,
    }
}

/// Round to the configured grid after averaging.
pub fn round(value: f64, method: RoundMethod) -> f64 {
    match method {
        RoundMethod::None => value,
        RoundMethod::Half => (value * 2.0).round() / 2.0,
        RoundMethod::Integer => value.round(),
    }
}

fn most_frequent<T, I>(values: I) -> Option<T>
where
    T: Clone + Eq + std::hash::Hash,
    I: IntoIterator<Item = T>,
{
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (position, value) in values.into_iter().enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }
    counts
        .into_iter()
        // Ties break towards the earliest seen value.
        .max_by(|(_, (count_a, pos_a)), (_, (count_b, pos_b))| {
            count_a.cmp(count_b).then(pos_b.cmp(pos_a))
        })
        .map(|(value, _)| value)
}
