//! Group orchestration.
//!
//! Wires the state cell, policies, dispatchers, classifier, suppression
//! controller and schedule service together, and exposes the entry
//! points the host calls: member/sensor events in, user commands in,
//! target state and suppression flag out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::error::ConfigError;
use crate::domain::models::attribute::{AttrMap, AttrValue, Attribute, HvacMode};
use crate::domain::models::config::GroupConfig;
use crate::domain::models::event::{MemberEvent, SensorEvent};
use crate::domain::models::state::{StateDelta, TargetState};
use crate::domain::ports::executor::CommandExecutor;
use crate::domain::ports::registry::MemberRegistry;
use crate::domain::ports::schedule::ScheduleSource;
use crate::domain::ports::store::StateStore;

use super::aggregator::{Aggregator, GroupView};
use super::dispatcher::CommandDispatcher;
use super::policy::{
    ActorPolicy, CommandPolicy, PolicyContext, RestorePolicy, SyncPolicy, WindowPolicy,
};
use super::schedule::{ScheduleService, ScheduleTrigger};
use super::state_cell::StateCell;
use super::sync_engine::{StartupGate, SyncEngine};
use super::window::{any_sensor_open, WindowSuppressor};

/// One logical thermostat built from many.
pub struct GroupService {
    config: Arc<GroupConfig>,
    registry: Arc<dyn MemberRegistry>,
    cell: Arc<StateCell>,
    aggregator: Aggregator,
    command_policy: CommandPolicy,
    restore_policy: RestorePolicy,
    command_dispatcher: CommandDispatcher,
    sync_engine: SyncEngine,
    window: WindowSuppressor,
    schedule: ScheduleService,
    startup: Arc<StartupGate>,
    store: Option<Arc<dyn StateStore>>,
    last_active_mode: std::sync::Mutex<Option<HvacMode>>,
}

impl GroupService {
    /// Build the group. Configuration inconsistencies surface here, once.
    pub fn new(
        config: GroupConfig,
        registry: Arc<dyn MemberRegistry>,
        executor: Arc<dyn CommandExecutor>,
        store: Option<Arc<dyn StateStore>>,
        schedule_source: Option<Arc<dyn ScheduleSource>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let cell = Arc::new(StateCell::new(TargetState::default()));
        let startup = Arc::new(StartupGate::new());

        let sync_policy = Arc::new(SyncPolicy::new(&config));
        let command_dispatcher = CommandDispatcher::new(
            Arc::new(CommandPolicy::new()) as Arc<dyn ActorPolicy>,
            Arc::clone(&cell),
            Arc::clone(&registry),
            Arc::clone(&executor),
            Arc::clone(&config),
        );
        let sync_dispatcher = CommandDispatcher::new(
            Arc::clone(&sync_policy) as Arc<dyn ActorPolicy>,
            Arc::clone(&cell),
            Arc::clone(&registry),
            Arc::clone(&executor),
            Arc::clone(&config),
        );
        let window_dispatcher = CommandDispatcher::new(
            Arc::new(WindowPolicy::new()) as Arc<dyn ActorPolicy>,
            Arc::clone(&cell),
            Arc::clone(&registry),
            Arc::clone(&executor),
            Arc::clone(&config),
        );
        let schedule_dispatcher = CommandDispatcher::new(
            Arc::new(super::policy::SchedulePolicy::new()) as Arc<dyn ActorPolicy>,
            Arc::clone(&cell),
            Arc::clone(&registry),
            Arc::clone(&executor),
            Arc::clone(&config),
        );

        let sync_engine = SyncEngine::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&cell),
            sync_policy,
            sync_dispatcher,
            Arc::clone(&startup),
        );
        let window = WindowSuppressor::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            window_dispatcher,
            Arc::clone(&cell),
        );
        let schedule = ScheduleService::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&cell),
            schedule_dispatcher,
            schedule_source,
        );
        let aggregator = Aggregator::new(Arc::clone(&config), Arc::clone(&registry));

        Ok(Self {
            config,
            registry,
            cell,
            aggregator,
            command_policy: CommandPolicy::new(),
            restore_policy: RestorePolicy::new(),
            command_dispatcher,
            sync_engine,
            window,
            schedule,
            startup,
            store,
            last_active_mode: std::sync::Mutex::new(None),
        })
    }

    /// Restore the target state snapshot, if a store is attached.
    pub async fn start(&self) {
        let Some(store) = &self.store else { return };
        match store.load() {
            Ok(Some(saved)) => {
                info!(group = %self.config.name, "restored target state snapshot");
                self.cell
                    .replace(saved.with_provenance(
                        crate::domain::models::command::Actor::Restore,
                        None,
                    ))
                    .await;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(group = %self.config.name, error = %error, "snapshot restore failed");
            }
        }
    }

    /// Current observed view of the group.
    pub async fn view(&self) -> GroupView {
        let target = self.cell.get().await;
        self.aggregator.view(target.mode)
    }

    /// Current target state.
    pub async fn target_state(&self) -> TargetState {
        self.cell.get().await
    }

    /// Whether window suppression currently holds the group.
    pub fn suppressed(&self) -> bool {
        self.window.suppressed()
    }

    /// Entry point for member state change events. The registry is
    /// expected to already reflect the new snapshot.
    pub async fn handle_member_event(&self, event: MemberEvent) {
        if !self.config.members.contains(&event.member) {
            return;
        }
        let target = self.cell.get().await;
        let view = self.aggregator.view(target.mode);

        if let Some(mode) = view.effective_mode {
            if mode != HvacMode::Off {
                *self
                    .last_active_mode
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(mode);
            }
        }

        if view.all_ready {
            // Cold start: adopt the first fully-observed snapshot as the
            // target, with restore provenance.
            if target.is_empty() && !view.observed.is_empty() {
                let ctx = self.context();
                if self.cell.propose(&self.restore_policy, &ctx, None, &view.observed).await
                {
                    info!(
                        group = %self.config.name,
                        seeded = ?view.observed,
                        "seeded target state from observed group state"
                    );
                }
            }
            if self.startup.mark_ready() {
                debug!(group = %self.config.name, "all members ready for the first time");
                self.schedule.apply(ScheduleTrigger::Startup).await;
            }
        }

        let target = self.cell.get().await;
        let delta = StateDelta::compute(
            event.member.clone(),
            &event.snapshot,
            &target,
            self.config.tolerance,
        );
        self.sync_engine.handle_change(delta, event.cause.as_ref()).await;
    }

    /// Entry point for window sensor events.
    pub async fn handle_sensor_event(&self, event: SensorEvent) {
        self.window.handle_sensor_event(event).await;
    }

    /// Entry point for schedule slot transitions.
    pub async fn handle_schedule_event(&self) {
        self.schedule.apply(ScheduleTrigger::Slot).await;
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) {
        self.user_command(AttrMap::from([(Attribute::HvacMode, AttrValue::Mode(mode))]))
            .await;
    }

    pub async fn set_temperature(&self, temperature: f64) {
        self.user_command(AttrMap::from([(
            Attribute::Temperature,
            AttrValue::Number(temperature),
        )]))
        .await;
    }

    pub async fn set_temperature_range(&self, low: f64, high: f64) {
        self.user_command(AttrMap::from([
            (Attribute::TargetTempLow, AttrValue::Number(low)),
            (Attribute::TargetTempHigh, AttrValue::Number(high)),
        ]))
        .await;
    }

    pub async fn set_humidity(&self, humidity: f64) {
        self.user_command(AttrMap::from([(
            Attribute::Humidity,
            AttrValue::Number(humidity),
        )]))
        .await;
    }

    pub async fn set_fan_mode(&self, fan_mode: impl Into<String>) {
        self.user_command(AttrMap::from([(
            Attribute::FanMode,
            AttrValue::choice(fan_mode.into()),
        )]))
        .await;
    }

    pub async fn set_preset_mode(&self, preset_mode: impl Into<String>) {
        self.user_command(AttrMap::from([(
            Attribute::PresetMode,
            AttrValue::choice(preset_mode.into()),
        )]))
        .await;
    }

    pub async fn set_swing_mode(&self, swing_mode: impl Into<String>) {
        self.user_command(AttrMap::from([(
            Attribute::SwingMode,
            AttrValue::choice(swing_mode.into()),
        )]))
        .await;
    }

    pub async fn set_swing_horizontal_mode(&self, swing_horizontal_mode: impl Into<String>) {
        self.user_command(AttrMap::from([(
            Attribute::SwingHorizontalMode,
            AttrValue::choice(swing_horizontal_mode.into()),
        )]))
        .await;
    }

    /// Switch back on: the last active mode if one was seen, otherwise
    /// the first supported non-off mode.
    pub async fn turn_on(&self) {
        let last_active = *self
            .last_active_mode
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(mode) = last_active {
            debug!(group = %self.config.name, mode = %mode, "turning on with last active mode");
            self.set_hvac_mode(mode).await;
            return;
        }
        let view = self.view().await;
        if let Some(mode) = view.supported_modes.iter().find(|m| **m != HvacMode::Off) {
            debug!(group = %self.config.name, mode = %mode, "turning on with first supported mode");
            self.set_hvac_mode(*mode).await;
        } else {
            debug!(group = %self.config.name, "cannot turn on, no active mode available");
        }
    }

    pub async fn turn_off(&self) {
        let view = self.view().await;
        if view.supported_modes.contains(&HvacMode::Off) {
            self.set_hvac_mode(HvacMode::Off).await;
        } else {
            debug!(group = %self.config.name, "cannot turn off, mode not supported");
        }
    }

    pub async fn toggle(&self) {
        let view = self.view().await;
        if view.effective_mode == Some(HvacMode::Off) {
            self.turn_on().await;
        } else {
            self.turn_off().await;
        }
    }

    /// Cancel every pending timer and in-flight retry, wait for
    /// settlement, then save a best-effort snapshot.
    pub async fn shutdown(&self) {
        self.command_dispatcher.shutdown().await;
        self.sync_engine.shutdown().await;
        self.window.shutdown().await;
        self.schedule.shutdown().await;
        if let Some(store) = &self.store {
            let state = self.cell.get().await;
            if let Err(error) = store.save(&state) {
                warn!(group = %self.config.name, error = %error, "snapshot save failed");
            }
        }
    }

    fn context(&self) -> PolicyContext<'_> {
        PolicyContext {
            config: &self.config,
            registry: &*self.registry,
            suppressed: any_sensor_open(&self.config.window, &*self.registry),
        }
    }

    async fn user_command(&self, payload: AttrMap) {
        // A rejected write is not an error: the dispatch still runs so a
        // mode change can break out of suppression.
        {
            let ctx = self.context();
            self.cell.propose(&self.command_policy, &ctx, None, &payload).await;
        }
        self.command_dispatcher.dispatch(Some(payload), false).await;
        self.schedule.apply(ScheduleTrigger::UserCommand).await;
    }
}
