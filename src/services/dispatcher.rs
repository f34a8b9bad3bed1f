//! Debounced, retrying command dispatcher.
//!
//! Computes the minimal set of per-attribute commands that bring
//! under-synced members to the ordered values, applies the actor's
//! safety filters, and retries failed batches with freshly recomputed
//! diffs. Members already at the ordered value are never re-commanded.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::models::attribute::{AttrMap, AttrValue, Attribute, HvacMode};
use crate::domain::models::command::{BatchTag, Command, CommandKind};
use crate::domain::models::config::GroupConfig;
use crate::domain::models::member::{MemberId, MemberSnapshot};
use crate::domain::models::state::TargetState;
use crate::domain::ports::executor::CommandExecutor;
use crate::domain::ports::registry::MemberRegistry;

use super::policy::{ActorPolicy, PolicyContext};
use super::state_cell::StateCell;
use super::window::any_sensor_open;

/// One dispatcher per actor, sharing the state cell, registry and
/// executor with the rest of the engine. Cheap to clone.
#[derive(Clone)]
pub struct CommandDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    policy: Arc<dyn ActorPolicy>,
    cell: Arc<StateCell>,
    registry: Arc<dyn MemberRegistry>,
    executor: Arc<dyn CommandExecutor>,
    config: Arc<GroupConfig>,
    /// Pending debounced execution, superseded by every fresh trigger.
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl CommandDispatcher {
    pub fn new(
        policy: Arc<dyn ActorPolicy>,
        cell: Arc<StateCell>,
        registry: Arc<dyn MemberRegistry>,
        executor: Arc<dyn CommandExecutor>,
        config: Arc<GroupConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                cell,
                registry,
                executor,
                config,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Dispatch the given payload, or the actor's projection of the
    /// target state when `payload` is `None`.
    ///
    /// Non-immediate calls coalesce: a fresh call within the cooldown
    /// window replaces the previous pending execution, and the most
    /// recent arguments win.
    pub async fn dispatch(&self, payload: Option<AttrMap>, immediate: bool) {
        if immediate {
            self.inner.execute(payload, None).await;
            return;
        }
        let mut pending = self.inner.pending.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let inner = Arc::clone(&self.inner);
        let delay = self.inner.config.timings.debounce();
        *pending = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.execute(payload, None).await;
        }));
    }

    /// Immediately dispatch a payload to an explicit member set,
    /// bypassing diff selection. Used by the suppression controller for
    /// zone-scoped force-off and restore.
    pub async fn dispatch_scoped(&self, members: Vec<MemberId>, payload: AttrMap) {
        self.inner.execute(Some(payload), Some(members)).await;
    }

    /// Cancel the pending debounced execution and any in-flight retry
    /// loop, and wait for settlement.
    pub async fn shutdown(&self) {
        let handle = self.inner.pending.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Inner {
    fn context(&self) -> PolicyContext<'_> {
        PolicyContext {
            config: &self.config,
            registry: &*self.registry,
            suppressed: any_sensor_open(&self.config.window, &*self.registry),
        }
    }

    async fn execute(&self, explicit: Option<AttrMap>, scope: Option<Vec<MemberId>>) {
        let state = self.cell.get().await;
        let initial = explicit
            .clone()
            .unwrap_or_else(|| state.project(self.policy.filter()));
        {
            let ctx = self.context();
            if self.policy.dispatch_blocked(&ctx, &initial) {
                debug!(
                    group = %self.config.name,
                    actor = %self.policy.actor(),
                    "dispatch blocked"
                );
                return;
            }
        }

        // One causal identity for the whole invocation, origin carried
        // from the most recent accepted write.
        let tag = BatchTag::new(self.policy.actor(), state.member.clone());
        let attempts = 1 + self.config.timings.retry_attempts;

        for attempt in 1..=attempts {
            // Recompute diffs fresh: devices may have moved mid-retry.
            let state = self.cell.get().await;
            let payload = explicit
                .clone()
                .unwrap_or_else(|| state.project(self.policy.filter()));
            let commands = {
                let ctx = self.context();
                self.plan(&ctx, &state, &payload, scope.as_deref())
            };
            if commands.is_empty() {
                debug!(
                    group = %self.config.name,
                    actor = %self.policy.actor(),
                    attempt,
                    "no pending commands, stopping"
                );
                return;
            }
            for command in &commands {
                match self.executor.execute(command, &tag).await {
                    Ok(()) => debug!(
                        group = %self.config.name,
                        actor = %self.policy.actor(),
                        attempt,
                        attempts,
                        command = command.kind.as_str(),
                        members = ?command.members,
                        "command issued"
                    ),
                    Err(error) => {
                        warn!(
                            group = %self.config.name,
                            actor = %self.policy.actor(),
                            attempt,
                            attempts,
                            command = command.kind.as_str(),
                            error = %error,
                            "command attempt failed"
                        );
                        break;
                    }
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.timings.retry_delay()).await;
            }
        }
    }

    /// Plan the command batch for one attempt.
    fn plan(
        &self,
        ctx: &PolicyContext<'_>,
        state: &TargetState,
        payload: &AttrMap,
        scope: Option<&[MemberId]>,
    ) -> Vec<Command> {
        let payload = self.inject_min_temp(payload);
        let mut commands = Vec::new();
        let mut range_planned = false;

        for (attr, value) in &payload {
            if !self.policy.filter().allows(*attr) {
                continue;
            }
            if self.policy.attribute_blocked(ctx, &payload, *attr) {
                continue;
            }

            // Low/high setpoints must travel in a single command.
            if matches!(attr, Attribute::TargetTempLow | Attribute::TargetTempHigh) {
                if range_planned {
                    continue;
                }
                let low = payload.get(&Attribute::TargetTempLow).and_then(AttrValue::as_number);
                let high =
                    payload.get(&Attribute::TargetTempHigh).and_then(AttrValue::as_number);
                let (Some(low), Some(high)) = (low, high) else { continue };
                let mut members = self.unsynced(
                    ctx,
                    state,
                    Attribute::TargetTempLow,
                    &AttrValue::Number(low),
                    scope,
                );
                for member in self.unsynced(
                    ctx,
                    state,
                    Attribute::TargetTempHigh,
                    &AttrValue::Number(high),
                    scope,
                ) {
                    if !members.contains(&member) {
                        members.push(member);
                    }
                }
                if !members.is_empty() {
                    commands.push(Command {
                        kind: CommandKind::SetTemperatureRange { low, high },
                        members,
                    });
                }
                range_planned = true;
                continue;
            }

            let Some(kind) = CommandKind::for_attribute(*attr, value) else { continue };
            let members = self.unsynced(ctx, state, *attr, value, scope);
            if !members.is_empty() {
                commands.push(Command { kind, members });
            }
        }
        commands
    }

    /// Members that need a command to reach the ordered value. An
    /// explicit scope bypasses selection entirely.
    fn unsynced(
        &self,
        ctx: &PolicyContext<'_>,
        state: &TargetState,
        attr: Attribute,
        ordered: &AttrValue,
        scope: Option<&[MemberId]>,
    ) -> Vec<MemberId> {
        if let Some(scope) = scope {
            return scope.to_vec();
        }
        let mut members = Vec::new();
        for id in &self.config.members {
            let Some(snapshot) = ctx.registry.snapshot(id) else { continue };
            if !snapshot.available {
                continue;
            }
            if !snapshot.supports(attr, ordered) {
                continue;
            }
            if self.skip_off_member(ctx, state, &snapshot, ordered) {
                debug!(group = %self.config.name, member = %id, "leaving off member alone");
                continue;
            }
            match snapshot.value(attr) {
                Some(current) if current.matches(ordered, self.config.tolerance) => {}
                _ => members.push(id.clone()),
            }
        }
        members
    }

    /// Partial-sync output filter: members that were manually switched
    /// off stay off while the group is on. Never skips when all members
    /// report off, otherwise an all-off fleet could never be woken.
    fn skip_off_member(
        &self,
        ctx: &PolicyContext<'_>,
        state: &TargetState,
        snapshot: &MemberSnapshot,
        ordered: &AttrValue,
    ) -> bool {
        if !self.config.ignore_off_members {
            return false;
        }
        if state.mode == Some(HvacMode::Off) {
            return false;
        }
        if !snapshot.is_off() {
            return false;
        }
        if ordered.is_off() {
            return false;
        }
        ctx.config.members.iter().any(|id| {
            ctx.registry
                .snapshot(id)
                .is_some_and(|s| s.available && !s.is_off())
        })
    }

    fn inject_min_temp(&self, payload: &AttrMap) -> AttrMap {
        let mut payload = payload.clone();
        if let Some(min_temp) = self.config.min_temp_when_off {
            if payload.get(&Attribute::HvacMode).is_some_and(AttrValue::is_off) {
                payload.insert(Attribute::Temperature, AttrValue::Number(min_temp));
            }
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::state::TargetState;
    use crate::infrastructure::mock::{InMemoryRegistry, LoopbackExecutor};
    use crate::services::policy::SyncPolicy;

    fn fixture(
        config: GroupConfig,
    ) -> (Arc<InMemoryRegistry>, Arc<LoopbackExecutor>, Arc<StateCell>, CommandDispatcher) {
        let config = Arc::new(config);
        let registry = Arc::new(InMemoryRegistry::new());
        let executor = Arc::new(LoopbackExecutor::new(Arc::clone(&registry)));
        let cell = Arc::new(StateCell::new(TargetState::default()));
        let dispatcher = CommandDispatcher::new(
            Arc::new(SyncPolicy::new(&config)),
            Arc::clone(&cell),
            registry.clone() as Arc<dyn MemberRegistry>,
            executor.clone() as Arc<dyn CommandExecutor>,
            config,
        );
        (registry, executor, cell, dispatcher)
    }

    fn heat_member(temperature: f64) -> MemberSnapshot {
        MemberSnapshot::default()
            .with_mode(HvacMode::Heat)
            .with_temperature(temperature)
            .with_hvac_modes(&[HvacMode::Off, HvacMode::Heat])
    }

    #[tokio::test]
    async fn test_only_diverged_members_are_commanded() {
        let config = GroupConfig::new("group", vec!["trv_a".into(), "trv_b".into()]);
        let (registry, executor, cell, dispatcher) = fixture(config);
        registry.set_member("trv_a", heat_member(21.0));
        registry.set_member("trv_b", heat_member(18.0));
        cell.replace(TargetState {
            mode: Some(HvacMode::Heat),
            temperature: Some(21.0),
            ..Default::default()
        })
        .await;

        dispatcher.dispatch(None, true).await;

        let issued = executor.issued();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].kind, CommandKind::SetTemperature { temperature: 21.0 });
        assert_eq!(issued[0].members, vec![MemberId::new("trv_b")]);
    }

    #[tokio::test]
    async fn test_redispatch_after_convergence_is_silent() {
        let config = GroupConfig::new("group", vec!["trv_a".into()]);
        let (registry, executor, cell, dispatcher) = fixture(config);
        registry.set_member("trv_a", heat_member(18.0));
        cell.replace(TargetState {
            mode: Some(HvacMode::Heat),
            temperature: Some(21.0),
            ..Default::default()
        })
        .await;

        dispatcher.dispatch(None, true).await;
        assert_eq!(executor.issued().len(), 1);

        // The loopback executor applied the command; nothing is pending.
        executor.clear();
        dispatcher.dispatch(None, true).await;
        assert!(executor.issued().is_empty());
    }

    #[tokio::test]
    async fn test_range_is_one_command() {
        let config = GroupConfig::new("group", vec!["trv_a".into()]);
        let (registry, executor, cell, dispatcher) = fixture(config);
        let mut snapshot = heat_member(21.0);
        snapshot.target_temp_low = Some(18.0);
        snapshot.target_temp_high = Some(25.0);
        registry.set_member("trv_a", snapshot);
        cell.replace(TargetState {
            mode: Some(HvacMode::Heat),
            target_temp_low: Some(19.0),
            target_temp_high: Some(23.0),
            ..Default::default()
        })
        .await;

        dispatcher.dispatch(None, true).await;

        let issued = executor.issued();
        assert_eq!(issued.len(), 1);
        assert_eq!(
            issued[0].kind,
            CommandKind::SetTemperatureRange { low: 19.0, high: 23.0 }
        );
    }

    #[tokio::test]
    async fn test_off_suppresses_setpoints_but_injects_min_temp() {
        let mut config = GroupConfig::new("group", vec!["trv_a".into()]);
        config.min_temp_when_off = Some(7.0);
        let (registry, executor, cell, dispatcher) = fixture(config);
        registry.set_member("trv_a", heat_member(21.0));
        cell.replace(TargetState {
            mode: Some(HvacMode::Off),
            temperature: Some(21.0),
            humidity: Some(45.0),
            ..Default::default()
        })
        .await;

        dispatcher.dispatch(None, true).await;

        let issued = executor.issued();
        let kinds: Vec<&CommandKind> = issued.iter().map(|c| &c.kind).collect();
        assert!(kinds.contains(&&CommandKind::SetHvacMode { mode: HvacMode::Off }));
        assert!(kinds.contains(&&CommandKind::SetTemperature { temperature: 7.0 }));
        assert!(!kinds
            .iter()
            .any(|k| matches!(k, CommandKind::SetHumidity { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recomputes_and_stops_when_converged() {
        let mut config = GroupConfig::new("group", vec!["trv_a".into()]);
        config.timings.retry_attempts = 3;
        let (registry, executor, cell, dispatcher) = fixture(config);
        registry.set_member("trv_a", heat_member(18.0));
        cell.replace(TargetState {
            mode: Some(HvacMode::Heat),
            temperature: Some(21.0),
            ..Default::default()
        })
        .await;

        // First attempt fails, second succeeds, remaining attempts see a
        // converged fleet and stop early.
        executor.fail_times(1);
        dispatcher.dispatch(None, true).await;
        assert_eq!(executor.issued().len(), 1);
    }
}
