//! In-memory adapters used by tests and the `simulate` command.
//!
//! `InMemoryRegistry` holds member snapshots, sensor states and zone
//! memberships behind plain locks. `LoopbackExecutor` records issued
//! commands, optionally applies them to the registry, and synthesizes
//! the member echo events a real transport would produce.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::error::ExecutorError;
use crate::domain::models::attribute::AttrMap;
use crate::domain::models::command::{BatchTag, CausalContext, Command, CommandKind};
use crate::domain::models::event::MemberEvent;
use crate::domain::models::member::{MemberId, MemberSnapshot, SensorId, ZoneId};
use crate::domain::ports::executor::CommandExecutor;
use crate::domain::ports::registry::MemberRegistry;
use crate::domain::ports::schedule::ScheduleSource;

/// Registry backed by in-memory maps.
#[derive(Default)]
pub struct InMemoryRegistry {
    members: RwLock<HashMap<MemberId, MemberSnapshot>>,
    sensors: RwLock<HashMap<SensorId, bool>>,
    zones: RwLock<HashMap<String, ZoneId>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_member(&self, member: impl Into<MemberId>, snapshot: MemberSnapshot) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(member.into(), snapshot);
    }

    /// Mutate a member snapshot in place.
    pub fn update_member(
        &self,
        member: impl Into<MemberId>,
        mutate: impl FnOnce(&mut MemberSnapshot),
    ) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let entry = members.entry(member.into()).or_default();
        mutate(entry);
    }

    pub fn set_sensor(&self, sensor: impl Into<SensorId>, open: bool) {
        self.sensors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sensor.into(), open);
    }

    pub fn set_zone(&self, entity: impl Into<String>, zone: impl Into<ZoneId>) {
        self.zones
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.into(), zone.into());
    }

    /// Apply a command to the stored snapshots the way a compliant
    /// device fleet would.
    pub fn apply_command(&self, command: &Command) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        for member in &command.members {
            let Some(snapshot) = members.get_mut(member) else { continue };
            match &command.kind {
                CommandKind::SetHvacMode { mode } => snapshot.mode = Some(*mode),
                CommandKind::SetTemperature { temperature } => {
                    snapshot.temperature = Some(*temperature);
                }
                CommandKind::SetTemperatureRange { low, high } => {
                    snapshot.target_temp_low = Some(*low);
                    snapshot.target_temp_high = Some(*high);
                }
                CommandKind::SetHumidity { humidity } => snapshot.humidity = Some(*humidity),
                CommandKind::SetFanMode { fan_mode } => {
                    snapshot.fan_mode = Some(fan_mode.clone());
                }
                CommandKind::SetPresetMode { preset_mode } => {
                    snapshot.preset_mode = Some(preset_mode.clone());
                }
                CommandKind::SetSwingMode { swing_mode } => {
                    snapshot.swing_mode = Some(swing_mode.clone());
                }
                CommandKind::SetSwingHorizontalMode { swing_horizontal_mode } => {
                    snapshot.swing_horizontal_mode = Some(swing_horizontal_mode.clone());
                }
            }
        }
    }
}

impl MemberRegistry for InMemoryRegistry {
    fn snapshot(&self, member: &MemberId) -> Option<MemberSnapshot> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(member)
            .cloned()
    }

    fn sensor_open(&self, sensor: &SensorId) -> Option<bool> {
        self.sensors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sensor)
            .copied()
    }

    fn zone_of(&self, entity: &str) -> Option<ZoneId> {
        self.zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned()
    }

    fn members_in_zone(&self, zone: &ZoneId) -> Vec<MemberId> {
        let zones = self.zones.read().unwrap_or_else(PoisonError::into_inner);
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        let mut in_zone: Vec<MemberId> = members
            .keys()
            .filter(|member| zones.get(member.as_str()) == Some(zone))
            .cloned()
            .collect();
        in_zone.sort();
        in_zone
    }
}

/// Executor that loops commands straight back into the registry.
pub struct LoopbackExecutor {
    registry: Arc<InMemoryRegistry>,
    apply: bool,
    echo: bool,
    issued: Mutex<Vec<Command>>,
    events: Mutex<VecDeque<MemberEvent>>,
    fail_remaining: AtomicU32,
}

impl LoopbackExecutor {
    /// Executor that applies commands and synthesizes echo events.
    pub fn new(registry: Arc<InMemoryRegistry>) -> Self {
        Self {
            registry,
            apply: true,
            echo: true,
            issued: Mutex::new(Vec::new()),
            events: Mutex::new(VecDeque::new()),
            fail_remaining: AtomicU32::new(0),
        }
    }

    /// Executor that only records commands, leaving the fleet untouched.
    pub fn recording(registry: Arc<InMemoryRegistry>) -> Self {
        Self { apply: false, echo: false, ..Self::new(registry) }
    }

    /// Fail the next `count` executions with a transport error.
    pub fn fail_times(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Successfully issued commands so far.
    pub fn issued(&self) -> Vec<Command> {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Drain the echo events synthesized for issued commands.
    pub fn drain_events(&self) -> Vec<MemberEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

#[async_trait]
impl CommandExecutor for LoopbackExecutor {
    async fn execute(&self, command: &Command, tag: &BatchTag) -> Result<(), ExecutorError> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExecutorError::Transport("injected failure".to_string()));
        }
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());
        if self.apply {
            self.registry.apply_command(command);
        }
        if self.echo {
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            for member in &command.members {
                if let Some(snapshot) = self.registry.snapshot(member) {
                    events.push_back(MemberEvent {
                        member: member.clone(),
                        snapshot,
                        cause: Some(CausalContext {
                            tag: tag.clone(),
                            payload: command.kind.payload(),
                        }),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Schedule source returning a fixed, settable slot.
#[derive(Default)]
pub struct FixedSchedule {
    slot: Mutex<Option<AttrMap>>,
}

impl FixedSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_slot(&self, slot: Option<AttrMap>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = slot;
    }
}

impl ScheduleSource for FixedSchedule {
    fn active_slot(&self) -> Option<AttrMap> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::attribute::HvacMode;
    use crate::domain::models::command::Actor;

    #[test]
    fn test_apply_command_updates_targeted_members_only() {
        let registry = InMemoryRegistry::new();
        registry.set_member("trv_a", MemberSnapshot::default().with_mode(HvacMode::Heat));
        registry.set_member("trv_b", MemberSnapshot::default().with_mode(HvacMode::Heat));
        registry.apply_command(&Command {
            kind: CommandKind::SetHvacMode { mode: HvacMode::Off },
            members: vec!["trv_a".into()],
        });
        assert!(registry.snapshot(&"trv_a".into()).unwrap().is_off());
        assert!(!registry.snapshot(&"trv_b".into()).unwrap().is_off());
    }

    #[test]
    fn test_members_in_zone() {
        let registry = InMemoryRegistry::new();
        registry.set_member("trv_a", MemberSnapshot::default());
        registry.set_member("trv_b", MemberSnapshot::default());
        registry.set_zone("trv_a", "living_room");
        registry.set_zone("w1", "living_room");
        let members = registry.members_in_zone(&"living_room".into());
        assert_eq!(members, vec![MemberId::new("trv_a")]);
    }

    #[tokio::test]
    async fn test_loopback_echoes_carry_causal_context() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.set_member("trv_a", MemberSnapshot::default().with_mode(HvacMode::Heat));
        let executor = LoopbackExecutor::new(Arc::clone(&registry));
        let command = Command {
            kind: CommandKind::SetHvacMode { mode: HvacMode::Off },
            members: vec!["trv_a".into()],
        };
        let tag = BatchTag::new(Actor::Command, None);
        executor.execute(&command, &tag).await.unwrap();

        let events = executor.drain_events();
        assert_eq!(events.len(), 1);
        let cause = events[0].cause.as_ref().unwrap();
        assert_eq!(cause.tag, tag);
        assert_eq!(cause.payload, command.kind.payload());
        // The echo reflects the applied command.
        assert!(events[0].snapshot.is_off());
    }

    #[tokio::test]
    async fn test_fail_times_injects_failures() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.set_member("trv_a", MemberSnapshot::default());
        let executor = LoopbackExecutor::new(Arc::clone(&registry));
        executor.fail_times(1);
        let command = Command {
            kind: CommandKind::SetTemperature { temperature: 21.0 },
            members: vec!["trv_a".into()],
        };
        let tag = BatchTag::new(Actor::Command, None);
        assert!(executor.execute(&command, &tag).await.is_err());
        assert!(executor.execute(&command, &tag).await.is_ok());
        assert_eq!(executor.issued().len(), 1);
    }
}
