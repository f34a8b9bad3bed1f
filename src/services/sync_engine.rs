//! Echo classification and deviation handling.
//!
//! Every member state change lands here once the aggregator has updated
//! the read side. The engine decides whether the change is an echo of a
//! batch this process issued, a side effect of one, or an independent
//! change requiring a policy response, and drives the enforcement
//! dispatcher accordingly.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::domain::models::attribute::{AttrMap, AttrValue, Attribute, HvacMode};
use crate::domain::models::command::CausalContext;
use crate::domain::models::config::{GroupConfig, SyncMode};
use crate::domain::models::state::StateDelta;
use crate::domain::ports::registry::MemberRegistry;

use super::dispatcher::CommandDispatcher;
use super::policy::{ActorPolicy, PolicyContext, SyncPolicy};
use super::state_cell::StateCell;
use super::window::any_sensor_open;

/// Latch set once when all members first become ready. Deviation
/// handling stays quiet for a grace period afterwards so the initial
/// burst of member reports cannot fight the restored target.
pub struct StartupGate {
    ready_at: std::sync::Mutex<Option<Instant>>,
}

impl StartupGate {
    pub fn new() -> Self {
        Self { ready_at: std::sync::Mutex::new(None) }
    }

    /// Mark the group ready. Returns true on the first call only.
    pub fn mark_ready(&self) -> bool {
        let mut ready_at = self
            .ready_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if ready_at.is_some() {
            return false;
        }
        *ready_at = Some(Instant::now());
        true
    }

    /// Whether the grace period after readiness has elapsed.
    pub fn settled(&self, grace: Duration) -> bool {
        self.ready_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some_and(|ready_at| ready_at.elapsed() >= grace)
    }
}

impl Default for StartupGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse classification of one member state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Passive mode, gates closed, or nothing deviated.
    Skipped,
    /// Every attribute matched the ordered value.
    CleanEcho,
    /// Mismatched acknowledgment of our own order, ignored.
    DirtyEcho,
    /// Unordered attributes reported during an echo window.
    SideEffects { accepted: bool },
    /// Independent change adopted into the target.
    Adopted,
    /// Independent off transition accepted from the last active member.
    AdoptedOff,
    /// Independent change left for the enforcement dispatcher.
    Corrected,
}

/// Classifies member state changes and drives the enforcement loop.
pub struct SyncEngine {
    config: Arc<GroupConfig>,
    registry: Arc<dyn MemberRegistry>,
    cell: Arc<StateCell>,
    policy: Arc<SyncPolicy>,
    dispatcher: CommandDispatcher,
    startup: Arc<StartupGate>,
}

impl SyncEngine {
    pub fn new(
        config: Arc<GroupConfig>,
        registry: Arc<dyn MemberRegistry>,
        cell: Arc<StateCell>,
        policy: Arc<SyncPolicy>,
        dispatcher: CommandDispatcher,
        startup: Arc<StartupGate>,
    ) -> Self {
        Self { config, registry, cell, policy, dispatcher, startup }
    }

    /// Cancel the enforcement dispatcher's pending work.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    fn context(&self) -> PolicyContext<'_> {
        PolicyContext {
            config: &self.config,
            registry: &*self.registry,
            suppressed: any_sensor_open(&self.config.window, &*self.registry),
        }
    }

    /// Handle one member state change.
    pub async fn handle_change(
        &self,
        delta: StateDelta,
        cause: Option<&CausalContext>,
    ) -> ChangeOutcome {
        if self.config.sync.mode == SyncMode::Passive {
            return ChangeOutcome::Skipped;
        }
        if !self.startup.settled(self.config.timings.startup_grace()) {
            debug!(group = %self.config.name, "startup phase, deviation handling quiet");
            return ChangeOutcome::Skipped;
        }
        if any_sensor_open(&self.config.window, &*self.registry) {
            debug!(group = %self.config.name, "suppression active, deviation handling quiet");
            return ChangeOutcome::Skipped;
        }
        if delta.is_empty() {
            return ChangeOutcome::Skipped;
        }

        debug!(
            group = %self.config.name,
            member = %delta.member,
            changes = ?delta.changes,
            caused_by = cause.map(|c| c.tag.actor.as_str()),
            "change detected"
        );

        if let Some(cause) = cause {
            if !cause.tag.actor.issues_trusted_echoes() {
                debug!(
                    group = %self.config.name,
                    actor = %cause.tag.actor,
                    "ignoring override echo"
                );
                return ChangeOutcome::Skipped;
            }
            return self.reconcile_echo(&delta, cause).await;
        }

        self.handle_independent(delta).await
    }

    /// Per-attribute reconciliation of a reaction to our own batch.
    async fn reconcile_echo(
        &self,
        delta: &StateDelta,
        cause: &CausalContext,
    ) -> ChangeOutcome {
        let mut accepted = AttrMap::new();
        let mut saw_side_effect = false;
        let mut saw_dirty = false;

        for (attr, reported) in &delta.changes {
            match cause.payload.get(attr) {
                None => {
                    // The device changed something we did not order.
                    saw_side_effect = true;
                    if let Some(master) = &cause.tag.origin {
                        if *master != delta.member {
                            debug!(
                                group = %self.config.name,
                                attr = %attr,
                                reporter = %delta.member,
                                master = %master,
                                "side effect ignored, reporter is not the batch master"
                            );
                            continue;
                        }
                    }
                    debug!(
                        group = %self.config.name,
                        attr = %attr,
                        value = %reported,
                        reporter = %delta.member,
                        "side effect accepted"
                    );
                    accepted.insert(*attr, reported.clone());
                }
                Some(ordered) => {
                    if !reported.matches(ordered, self.config.tolerance) {
                        // The order stands; a mismatched immediate report
                        // is an intermediate state, not a decision.
                        saw_dirty = true;
                        debug!(
                            group = %self.config.name,
                            attr = %attr,
                            reported = %reported,
                            ordered = %ordered,
                            "dirty echo ignored, waiting for settling"
                        );
                    }
                }
            }
        }

        if !accepted.is_empty() {
            let ctx = self.context();
            let ok = self
                .cell
                .propose(&*self.policy, &ctx, Some(&delta.member), &accepted)
                .await;
            return ChangeOutcome::SideEffects { accepted: ok };
        }
        if saw_side_effect {
            return ChangeOutcome::SideEffects { accepted: false };
        }
        if saw_dirty {
            ChangeOutcome::DirtyEcho
        } else {
            ChangeOutcome::CleanEcho
        }
    }

    /// Policy response to a change with no usable causal context.
    async fn handle_independent(&self, delta: StateDelta) -> ChangeOutcome {
        let target = self.cell.get().await;
        let mut changes = delta.changes;

        // Setpoints reported while the group is off are noise (frost
        // protection values and the like), unless this very event
        // switches the group back on.
        let switching_on = matches!(
            changes.get(&Attribute::HvacMode),
            Some(AttrValue::Mode(mode)) if *mode != HvacMode::Off
        );
        if target.mode == Some(HvacMode::Off) && !switching_on {
            changes.retain(|attr, _| !attr.is_setpoint());
            if changes.is_empty() {
                debug!(group = %self.config.name, "group is off, ignoring setpoint changes");
                return ChangeOutcome::Skipped;
            }
        }

        let outcome = match self.config.sync.mode {
            SyncMode::Passive => return ChangeOutcome::Skipped,
            SyncMode::Adopt => {
                let masked = self.policy.filter().mask(&changes);
                if masked.is_empty() {
                    debug!(group = %self.config.name, "changes filtered out, target unchanged");
                    ChangeOutcome::Corrected
                } else {
                    let ctx = self.context();
                    if self
                        .cell
                        .propose(&*self.policy, &ctx, Some(&delta.member), &masked)
                        .await
                    {
                        ChangeOutcome::Adopted
                    } else {
                        ChangeOutcome::Corrected
                    }
                }
            }
            SyncMode::Enforce => {
                // Deviations are corrected, with one exception: an off
                // report may still win through the last-man-standing
                // gatekeeper rule.
                let reported_off = changes
                    .get(&Attribute::HvacMode)
                    .is_some_and(AttrValue::is_off);
                if self.config.ignore_off_members && reported_off {
                    let off = AttrMap::from([(
                        Attribute::HvacMode,
                        AttrValue::Mode(HvacMode::Off),
                    )]);
                    let ctx = self.context();
                    if self
                        .cell
                        .propose(&*self.policy, &ctx, Some(&delta.member), &off)
                        .await
                    {
                        ChangeOutcome::AdoptedOff
                    } else {
                        ChangeOutcome::Corrected
                    }
                } else {
                    ChangeOutcome::Corrected
                }
            }
        };

        // Push the (possibly updated) target back onto every diverged
        // member.
        self.dispatcher.dispatch(None, false).await;
        outcome
    }
}
