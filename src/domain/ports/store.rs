//! Snapshot store port - best-effort target state persistence.

use crate::domain::error::StoreError;
use crate::domain::models::state::TargetState;

/// Loads and saves the target state snapshot used for startup restore.
/// This is a restore snapshot, not a log; losing it costs nothing but
/// the first reseed.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<TargetState>, StoreError>;

    fn save(&self, state: &TargetState) -> Result<(), StoreError>;
}
