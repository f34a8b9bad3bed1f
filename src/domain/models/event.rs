//! Inbound events consumed by the reconciliation loop.

use serde::{Deserialize, Serialize};

use super::command::CausalContext;
use super::member::{MemberId, MemberSnapshot, SensorId};

/// A member reported a new state. `cause` carries the causal batch record
/// when the change is a reaction to a command this process issued; host
/// adapters leave it empty for changes of unknown origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEvent {
    pub member: MemberId,
    pub snapshot: MemberSnapshot,
    #[serde(default)]
    pub cause: Option<CausalContext>,
}

impl MemberEvent {
    pub fn new(member: impl Into<MemberId>, snapshot: MemberSnapshot) -> Self {
        Self { member: member.into(), snapshot, cause: None }
    }

    pub fn with_cause(mut self, cause: CausalContext) -> Self {
        self.cause = Some(cause);
        self
    }
}

/// A monitored window/contact sensor changed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub sensor: SensorId,
    pub open: bool,
}

impl SensorEvent {
    pub fn new(sensor: impl Into<SensorId>, open: bool) -> Self {
        Self { sensor: sensor.into(), open }
    }
}
