//! The single owned target-state cell.
//!
//! All mutation funnels through [`StateCell::propose`], which evaluates
//! the actor's write policy and swaps in the structurally updated state
//! while holding the write lock, so check-then-act is atomic within one
//! scheduling turn.

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::models::attribute::AttrMap;
use crate::domain::models::member::MemberId;
use crate::domain::models::state::TargetState;

use super::policy::{ActorPolicy, PolicyContext};

/// Owns the group's target state. Handed around as `Arc<StateCell>`;
/// never duplicated.
pub struct StateCell {
    state: RwLock<TargetState>,
}

impl StateCell {
    pub fn new(initial: TargetState) -> Self {
        Self { state: RwLock::new(initial) }
    }

    /// Current target state, by value.
    pub async fn get(&self) -> TargetState {
        self.state.read().await.clone()
    }

    /// Replace the state wholesale. Only the restore path uses this.
    pub async fn replace(&self, next: TargetState) {
        *self.state.write().await = next;
    }

    /// Propose a mutation on behalf of an actor. Returns whether the
    /// write was accepted; on rejection the state is untouched.
    pub async fn propose(
        &self,
        policy: &dyn ActorPolicy,
        ctx: &PolicyContext<'_>,
        member: Option<&MemberId>,
        changes: &AttrMap,
    ) -> bool {
        if changes.is_empty() {
            return false;
        }
        let mut guard = self.state.write().await;
        if !policy.write_allowed(ctx, member, changes) {
            return false;
        }
        let next = guard
            .update(changes)
            .with_provenance(policy.actor(), member.cloned());
        *guard = next;
        debug!(
            group = %ctx.config.name,
            actor = %policy.actor(),
            member = member.map(MemberId::as_str),
            changes = ?changes,
            "target state updated"
        );
        true
    }
}
