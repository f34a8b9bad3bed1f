//! Scripted simulation against the in-memory adapters.
//!
//! The script seeds a fleet, then replays user commands, member reports
//! and sensor events through the full engine. Echo events synthesized by
//! the loopback executor are delivered back in, closing the loop the way
//! a live transport would.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::domain::models::attribute::HvacMode;
use crate::domain::models::config::GroupConfig;
use crate::domain::models::event::{MemberEvent, SensorEvent};
use crate::domain::models::member::MemberSnapshot;
use crate::domain::ports::executor::CommandExecutor;
use crate::domain::ports::registry::MemberRegistry;
use crate::infrastructure::mock::{InMemoryRegistry, LoopbackExecutor};
use crate::services::group::GroupService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct Script {
    /// Initial member snapshots.
    #[serde(default)]
    members: BTreeMap<String, MemberSnapshot>,
    /// Entity (member or sensor) to zone assignments.
    #[serde(default)]
    zones: BTreeMap<String, String>,
    /// Initial sensor states.
    #[serde(default)]
    sensors: BTreeMap<String, bool>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    SetHvacMode { mode: HvacMode },
    SetTemperature { temperature: f64 },
    SetTemperatureRange { low: f64, high: f64 },
    SetFanMode { fan_mode: String },
    /// A member reports a new snapshot of unknown origin.
    MemberReport { member: String, snapshot: MemberSnapshot },
    /// A window sensor changes state.
    Sensor { sensor: String, open: bool },
    /// Let timers run for a while.
    Wait { ms: u64 },
    /// Deliver pending echo events back into the engine.
    DeliverEchoes,
    /// Print the current target state.
    ShowState,
}

/// Maximum echo delivery rounds per drain, in case a script builds a
/// fleet that never converges.
const MAX_ECHO_ROUNDS: usize = 8;

pub async fn run(config: GroupConfig, script_path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;
    let script: Script = serde_yaml::from_str(&text).context("parsing script")?;

    let registry = Arc::new(InMemoryRegistry::new());
    for (member, snapshot) in &script.members {
        registry.set_member(member.as_str(), snapshot.clone());
    }
    for (entity, zone) in &script.zones {
        registry.set_zone(entity.clone(), zone.as_str());
    }
    for (sensor, open) in &script.sensors {
        registry.set_sensor(sensor.as_str(), *open);
    }

    let executor = Arc::new(LoopbackExecutor::new(Arc::clone(&registry)));
    let group = GroupService::new(
        config,
        registry.clone() as Arc<dyn MemberRegistry>,
        executor.clone() as Arc<dyn CommandExecutor>,
        None,
        None,
    )?;
    group.start().await;

    // Announce the initial fleet so the target can seed.
    for member in script.members.keys() {
        if let Some(snapshot) = registry.snapshot(&member.as_str().into()) {
            group
                .handle_member_event(MemberEvent::new(member.as_str(), snapshot))
                .await;
        }
    }

    for step in script.steps {
        match step {
            Step::SetHvacMode { mode } => group.set_hvac_mode(mode).await,
            Step::SetTemperature { temperature } => group.set_temperature(temperature).await,
            Step::SetTemperatureRange { low, high } => {
                group.set_temperature_range(low, high).await;
            }
            Step::SetFanMode { fan_mode } => group.set_fan_mode(fan_mode).await,
            Step::MemberReport { member, snapshot } => {
                registry.set_member(member.as_str(), snapshot.clone());
                group
                    .handle_member_event(MemberEvent::new(member.as_str(), snapshot))
                    .await;
            }
            Step::Sensor { sensor, open } => {
                registry.set_sensor(sensor.as_str(), open);
                group.handle_sensor_event(SensorEvent::new(sensor.as_str(), open)).await;
            }
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            Step::DeliverEchoes => deliver_echoes(&group, &executor).await,
            Step::ShowState => {
                let state = group.target_state().await;
                println!("--- target state ---");
                println!("{}", serde_yaml::to_string(&state)?);
            }
        }
        // Give spawned dispatch tasks a turn.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    deliver_echoes(&group, &executor).await;
    group.shutdown().await;

    let state = group.target_state().await;
    println!("=== final target state ===");
    println!("{}", serde_yaml::to_string(&state)?);
    println!("=== issued commands ===");
    for command in executor.issued() {
        println!(
            "{} -> {:?}",
            command.kind.as_str(),
            command.members.iter().map(|m| m.as_str()).collect::<Vec<_>>()
        );
    }
    Ok(())
}

async fn deliver_echoes(group: &GroupService, executor: &LoopbackExecutor) {
    for _ in 0..MAX_ECHO_ROUNDS {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = executor.drain_events();
        if events.is_empty() {
            return;
        }
        for event in events {
            group.handle_member_event(event).await;
        }
    }
}
