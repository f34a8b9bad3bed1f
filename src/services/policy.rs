//! Per-actor policy strategies.
//!
//! One strategy object per actor decides whether a proposed target-state
//! write is allowed, whether a dispatch may run at all, and which
//! attributes it may touch. Policies compose a small set of reusable
//! predicates; the actors differ only in which predicates they apply.

use tracing::debug;

use crate::domain::models::attribute::{AttrMap, AttrValue, Attribute};
use crate::domain::models::command::Actor;
use crate::domain::models::config::GroupConfig;
use crate::domain::models::member::MemberId;
use crate::domain::models::state::AttrFilter;
use crate::domain::ports::registry::MemberRegistry;

/// Shared decision inputs, built fresh for every decision so that the
/// suppression flag and member snapshots are live.
pub struct PolicyContext<'a> {
    pub config: &'a GroupConfig,
    pub registry: &'a dyn MemberRegistry,
    /// Whether window suppression currently holds the group off.
    pub suppressed: bool,
}

/// Strategy interface for one actor.
pub trait ActorPolicy: Send + Sync {
    fn actor(&self) -> Actor;

    /// Attribute mask for this actor's projections and dispatches.
    fn filter(&self) -> &AttrFilter;

    /// Gatekeeper decision for a proposed target-state write.
    fn write_allowed(
        &self,
        ctx: &PolicyContext<'_>,
        member: Option<&MemberId>,
        changes: &AttrMap,
    ) -> bool;

    /// Whole-dispatch veto, checked once before the retry loop.
    fn dispatch_blocked(&self, ctx: &PolicyContext<'_>, payload: &AttrMap) -> bool;

    /// Per-attribute veto. Defaults to wake-up prevention: no setpoint
    /// commands while the payload orders the group off, except the
    /// configured minimum temperature injection.
    fn attribute_blocked(
        &self,
        ctx: &PolicyContext<'_>,
        payload: &AttrMap,
        attr: Attribute,
    ) -> bool {
        wakeup_blocks(ctx, payload, attr)
    }
}

/// Writes are blocked while suppression holds, except explicit mode
/// changes, which must stay possible so a user can force the group out
/// of a suppressed state.
pub fn blocking_allows(ctx: &PolicyContext<'_>, changes: &AttrMap) -> bool {
    if ctx.suppressed && !changes.contains_key(&Attribute::HvacMode) {
        debug!(group = %ctx.config.name, "write blocked, suppression active");
        return false;
    }
    true
}

/// Last-man-standing: with `ignore_off_members` enabled, an off write is
/// only accepted from the final still-active member. Checks live
/// snapshots, not cached state, so a stale view cannot deadlock the
/// group in the on state.
pub fn last_man_standing_allows(
    ctx: &PolicyContext<'_>,
    member: Option<&MemberId>,
    changes: &AttrMap,
) -> bool {
    if !ctx.config.ignore_off_members {
        return true;
    }
    match changes.get(&Attribute::HvacMode) {
        Some(value) if value.is_off() => {}
        _ => return true,
    }
    let other_active: Vec<&MemberId> = ctx
        .config
        .members
        .iter()
        .filter(|id| member != Some(*id))
        .filter(|id| {
            ctx.registry
                .snapshot(id)
                .is_some_and(|s| s.available && !s.is_off())
        })
        .collect();
    if other_active.is_empty() {
        debug!(group = %ctx.config.name, "off write accepted, last active member");
        true
    } else {
        debug!(
            group = %ctx.config.name,
            active = ?other_active,
            "off write rejected, other members still active"
        );
        false
    }
}

/// Wake-up prevention: while the payload orders the group off, every
/// setpoint-bearing attribute is suppressed. The configured minimum
/// temperature is the one exception, since some actuators need it to
/// avoid falling back to their own default.
pub fn wakeup_blocks(ctx: &PolicyContext<'_>, payload: &AttrMap, attr: Attribute) -> bool {
    let ordering_off = payload.get(&Attribute::HvacMode).is_some_and(AttrValue::is_off);
    if !ordering_off || attr == Attribute::HvacMode {
        return false;
    }
    if attr == Attribute::Temperature && ctx.config.min_temp_when_off.is_some() {
        return false;
    }
    true
}

/// Direct user/API commands. Explicit user intent wins: no attribute
/// blocking, and suppression only stops payloads that do not change the
/// mode.
pub struct CommandPolicy {
    filter: AttrFilter,
}

impl CommandPolicy {
    pub fn new() -> Self {
        Self { filter: AttrFilter::all() }
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorPolicy for CommandPolicy {
    fn actor(&self) -> Actor {
        Actor::Command
    }

    fn filter(&self) -> &AttrFilter {
        &self.filter
    }

    fn write_allowed(
        &self,
        ctx: &PolicyContext<'_>,
        _member: Option<&MemberId>,
        changes: &AttrMap,
    ) -> bool {
        blocking_allows(ctx, changes)
    }

    fn dispatch_blocked(&self, ctx: &PolicyContext<'_>, payload: &AttrMap) -> bool {
        ctx.suppressed && !payload.contains_key(&Attribute::HvacMode)
    }

    fn attribute_blocked(
        &self,
        _ctx: &PolicyContext<'_>,
        _payload: &AttrMap,
        _attr: Attribute,
    ) -> bool {
        false
    }
}

/// Enforcement sync. Respects the configured attribute subset, blocks
/// entirely during suppression and applies the last-man-standing rule to
/// off writes.
pub struct SyncPolicy {
    filter: AttrFilter,
}

impl SyncPolicy {
    pub fn new(config: &GroupConfig) -> Self {
        Self { filter: AttrFilter::from_attrs(&config.sync.attributes) }
    }
}

impl ActorPolicy for SyncPolicy {
    fn actor(&self) -> Actor {
        Actor::Sync
    }

    fn filter(&self) -> &AttrFilter {
        &self.filter
    }

    fn write_allowed(
        &self,
        ctx: &PolicyContext<'_>,
        member: Option<&MemberId>,
        changes: &AttrMap,
    ) -> bool {
        blocking_allows(ctx, changes) && last_man_standing_allows(ctx, member, changes)
    }

    fn dispatch_blocked(&self, ctx: &PolicyContext<'_>, _payload: &AttrMap) -> bool {
        ctx.suppressed
    }
}

/// Window suppression. Never writes the target state; it issues direct
/// commands around it instead, and those must keep working while
/// suppression is active.
pub struct WindowPolicy {
    filter: AttrFilter,
}

impl WindowPolicy {
    pub fn new() -> Self {
        Self { filter: AttrFilter::all() }
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorPolicy for WindowPolicy {
    fn actor(&self) -> Actor {
        Actor::Window
    }

    fn filter(&self) -> &AttrFilter {
        &self.filter
    }

    fn write_allowed(
        &self,
        ctx: &PolicyContext<'_>,
        _member: Option<&MemberId>,
        _changes: &AttrMap,
    ) -> bool {
        debug!(group = %ctx.config.name, "write rejected, window actor is read-only");
        false
    }

    fn dispatch_blocked(&self, _ctx: &PolicyContext<'_>, _payload: &AttrMap) -> bool {
        false
    }
}

/// Schedule slot application.
pub struct SchedulePolicy {
    filter: AttrFilter,
}

impl SchedulePolicy {
    pub fn new() -> Self {
        Self { filter: AttrFilter::all() }
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorPolicy for SchedulePolicy {
    fn actor(&self) -> Actor {
        Actor::Schedule
    }

    fn filter(&self) -> &AttrFilter {
        &self.filter
    }

    fn write_allowed(
        &self,
        ctx: &PolicyContext<'_>,
        _member: Option<&MemberId>,
        changes: &AttrMap,
    ) -> bool {
        blocking_allows(ctx, changes)
    }

    fn dispatch_blocked(&self, ctx: &PolicyContext<'_>, _payload: &AttrMap) -> bool {
        ctx.suppressed
    }
}

/// Startup seeding and snapshot restore. Always allowed to write; never
/// dispatches.
pub struct RestorePolicy {
    filter: AttrFilter,
}

impl RestorePolicy {
    pub fn new() -> Self {
        Self { filter: AttrFilter::all() }
    }
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorPolicy for RestorePolicy {
    fn actor(&self) -> Actor {
        Actor::Restore
    }

    fn filter(&self) -> &AttrFilter {
        &self.filter
    }

    fn write_allowed(
        &self,
        _ctx: &PolicyContext<'_>,
        _member: Option<&MemberId>,
        _changes: &AttrMap,
    ) -> bool {
        true
    }

    fn dispatch_blocked(&self, _ctx: &PolicyContext<'_>, _payload: &AttrMap) -> bool {
        true
    }
}
