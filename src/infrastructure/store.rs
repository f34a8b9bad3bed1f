//! JSON file implementation of the snapshot store.

use std::path::PathBuf;

use crate::domain::error::StoreError;
use crate::domain::models::state::TargetState;
use crate::domain::ports::store::StateStore;

/// Stores the target state as pretty-printed JSON at a fixed path.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Option<TargetState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&contents)?;
        Ok(Some(state))
    }

    fn save(&self, state: &TargetState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}
