//! Schedule slot application with override and resync timers.
//!
//! Observes slot transitions and user commands. A user command can take
//! control for a configured override window; otherwise the active slot
//! is written through the schedule gatekeeper and pushed out whenever it
//! deviates from the target.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::models::attribute::AttrMap;
use crate::domain::models::command::Actor;
use crate::domain::models::config::GroupConfig;
use crate::domain::ports::registry::MemberRegistry;
use crate::domain::ports::schedule::ScheduleSource;

use super::dispatcher::CommandDispatcher;
use super::policy::{PolicyContext, SchedulePolicy};
use super::state_cell::StateCell;
use super::window::any_sensor_open;

/// Why the schedule logic is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTrigger {
    /// The active slot changed.
    Slot,
    /// A user command executed; arms the override timer.
    UserCommand,
    /// The periodic resync timer fired.
    Resync,
    /// The user override window expired.
    Override,
    /// All members became ready for the first time.
    Startup,
}

impl ScheduleTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slot => "slot",
            Self::UserCommand => "user_command",
            Self::Resync => "resync",
            Self::Override => "override",
            Self::Startup => "startup",
        }
    }
}

/// Applies schedule slots to the target state.
#[derive(Clone)]
pub struct ScheduleService {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<GroupConfig>,
    registry: Arc<dyn MemberRegistry>,
    cell: Arc<StateCell>,
    policy: SchedulePolicy,
    dispatcher: CommandDispatcher,
    source: Option<Arc<dyn ScheduleSource>>,
    /// Single pending automation timer (override or resync).
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleService {
    pub fn new(
        config: Arc<GroupConfig>,
        registry: Arc<dyn MemberRegistry>,
        cell: Arc<StateCell>,
        dispatcher: CommandDispatcher,
        source: Option<Arc<dyn ScheduleSource>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                cell,
                policy: SchedulePolicy::new(),
                dispatcher,
                source,
                timer: Mutex::new(None),
            }),
        }
    }

    /// Evaluate the schedule for the given trigger.
    pub async fn apply(&self, trigger: ScheduleTrigger) {
        Inner::apply(&self.inner, trigger).await;
    }

    /// Cancel the pending automation timer and wait for settlement.
    pub async fn shutdown(&self) {
        let handle = self.inner.timer.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.dispatcher.shutdown().await;
    }
}

impl Inner {
    async fn apply(this: &Arc<Self>, trigger: ScheduleTrigger) {
        let Some(source) = &this.source else { return };

        debug!(
            group = %this.config.name,
            trigger = trigger.as_str(),
            "schedule evaluation"
        );

        // Sticky override: while the user is in control, slot
        // transitions are ignored until the override expires.
        if trigger == ScheduleTrigger::Slot && this.config.schedule.persist_changes {
            let source_actor = this.cell.get().await.source;
            if !matches!(source_actor, None | Some(Actor::Schedule) | Some(Actor::Restore)) {
                debug!(
                    group = %this.config.name,
                    "sticky override active, ignoring slot transition"
                );
                return;
            }
        }

        let Some(slot) = source.active_slot() else { return };
        if slot.is_empty() {
            return;
        }

        if trigger != ScheduleTrigger::UserCommand {
            let target = this.cell.get().await;
            let current: AttrMap = slot
                .keys()
                .filter_map(|attr| target.get(*attr).map(|value| (*attr, value)))
                .collect();
            if current != slot {
                let ctx = PolicyContext {
                    config: &this.config,
                    registry: &*this.registry,
                    suppressed: any_sensor_open(&this.config.window, &*this.registry),
                };
                this.cell.propose(&this.policy, &ctx, None, &slot).await;
            }
            this.dispatcher.dispatch(None, true).await;
        }

        let (next, duration) = if trigger == ScheduleTrigger::UserCommand
            && this.config.schedule.override_minutes > 0
        {
            (ScheduleTrigger::Override, this.config.schedule.override_duration())
        } else {
            (ScheduleTrigger::Resync, this.config.schedule.resync())
        };
        Self::arm_timer(this, next, duration).await;
    }

    async fn arm_timer(this: &Arc<Self>, trigger: ScheduleTrigger, duration: Duration) {
        let mut timer = this.timer.lock().await;
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        if duration.is_zero() {
            return;
        }
        debug!(
            group = %this.config.name,
            trigger = trigger.as_str(),
            secs = duration.as_secs(),
            "schedule timer armed"
        );
        let task_this = Arc::clone(this);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            Self::apply_boxed(task_this, trigger).await;
        }));
    }

    /// Type-erased re-entry point for timer tasks.
    fn apply_boxed(this: Arc<Self>, trigger: ScheduleTrigger) -> BoxFuture<'static, ()> {
        Box::pin(async move { Self::apply(&this, trigger).await })
    }
}
