//! Shared test harness: a full engine wired to the in-memory adapters.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use thermoflock::infrastructure::mock::{FixedSchedule, InMemoryRegistry, LoopbackExecutor};
use thermoflock::services::GroupService;
use thermoflock::{
    CommandExecutor, GroupConfig, HvacMode, MemberEvent, MemberId, MemberRegistry,
    MemberSnapshot, ScheduleSource, SensorEvent,
};

pub struct Harness {
    pub registry: Arc<InMemoryRegistry>,
    pub executor: Arc<LoopbackExecutor>,
    pub schedule: Arc<FixedSchedule>,
    pub group: GroupService,
}

/// Base configuration with instant startup so deviation handling is
/// active from the first event.
pub fn base_config(members: &[&str]) -> GroupConfig {
    let mut config = GroupConfig::new(
        "test_group",
        members.iter().map(|member| MemberId::new(*member)).collect(),
    );
    config.timings.startup_grace_ms = 0;
    config
}

pub fn harness(config: GroupConfig) -> Harness {
    let registry = Arc::new(InMemoryRegistry::new());
    let executor = Arc::new(LoopbackExecutor::new(Arc::clone(&registry)));
    let schedule = Arc::new(FixedSchedule::new());
    let group = GroupService::new(
        config,
        registry.clone() as Arc<dyn MemberRegistry>,
        executor.clone() as Arc<dyn CommandExecutor>,
        None,
        Some(schedule.clone() as Arc<dyn ScheduleSource>),
    )
    .expect("valid test config");
    Harness { registry, executor, schedule, group }
}

/// A heating member snapshot supporting off/heat and a few fan modes.
pub fn heat_member(temperature: f64) -> MemberSnapshot {
    let mut snapshot = MemberSnapshot::default()
        .with_mode(HvacMode::Heat)
        .with_temperature(temperature)
        .with_hvac_modes(&[HvacMode::Off, HvacMode::Heat]);
    snapshot.fan_modes = vec!["low".into(), "medium".into(), "high".into()];
    snapshot
}

pub fn off_member(temperature: f64) -> MemberSnapshot {
    heat_member(temperature).with_mode(HvacMode::Off)
}

impl Harness {
    /// Store a snapshot and feed the corresponding event (no causal
    /// context, i.e. a change of unknown origin).
    pub async fn report(&self, member: &str, snapshot: MemberSnapshot) {
        self.registry.set_member(member, snapshot.clone());
        self.group.handle_member_event(MemberEvent::new(member, snapshot)).await;
    }

    pub async fn sensor(&self, sensor: &str, open: bool) {
        self.registry.set_sensor(sensor, open);
        self.group.handle_sensor_event(SensorEvent::new(sensor, open)).await;
    }

    /// Let spawned dispatch tasks run.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    /// Deliver synthesized echo events back into the engine until the
    /// loop drains.
    pub async fn deliver_echoes(&self) {
        for _ in 0..8 {
            self.settle().await;
            let events = self.executor.drain_events();
            if events.is_empty() {
                return;
            }
            for event in events {
                self.group.handle_member_event(event).await;
            }
        }
    }
}
