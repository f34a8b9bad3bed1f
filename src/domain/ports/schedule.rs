//! Schedule source port - the currently active slot, if any.

use crate::domain::models::attribute::AttrMap;

/// Supplies the attribute values of the currently active schedule slot.
pub trait ScheduleSource: Send + Sync {
    /// The active slot's attributes, or `None` outside any slot.
    fn active_slot(&self) -> Option<AttrMap>;
}
