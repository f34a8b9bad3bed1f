//! Member registry port - live snapshots, sensor states and zone lookups.

use crate::domain::models::member::{MemberId, MemberSnapshot, SensorId, ZoneId};

/// Read-only access to the current device state as the host knows it.
///
/// All methods are synchronous: gatekeeper decisions read live snapshots
/// between check and write, and introducing a suspension point there
/// would break their atomicity within a scheduling turn.
pub trait MemberRegistry: Send + Sync {
    /// Current snapshot for a member, if the host knows it at all.
    fn snapshot(&self, member: &MemberId) -> Option<MemberSnapshot>;

    /// Whether a contact sensor currently reports open.
    fn sensor_open(&self, sensor: &SensorId) -> Option<bool>;

    /// Zone membership for any entity (member or sensor).
    fn zone_of(&self, entity: &str) -> Option<ZoneId>;

    /// All members the host places in the given zone.
    fn members_in_zone(&self, zone: &ZoneId) -> Vec<MemberId>;
}
