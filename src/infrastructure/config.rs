//! Configuration loading.
//!
//! Merges a YAML file with `THERMOFLOCK_`-prefixed environment
//! overrides, then runs the one-time setup validation.

use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::error::ConfigError;
use crate::domain::models::config::GroupConfig;

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Loads the group configuration.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file plus the
    /// environment. `THERMOFLOCK_SYNC__MODE=enforce` overrides
    /// `sync.mode`, and so on.
    pub fn load(path: &Path) -> Result<GroupConfig, ConfigLoadError> {
        let config: GroupConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("THERMOFLOCK_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::SyncMode;
    use std::io::Write;

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name: upstairs\nmembers: [trv_a, trv_b]\nsync:\n  mode: enforce\n"
        )
        .unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.name, "upstairs");
        assert_eq!(config.sync.mode, SyncMode::Enforce);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name: empty\nmembers: []\n").unwrap();
        assert!(matches!(
            ConfigLoader::load(file.path()),
            Err(ConfigLoadError::Invalid(ConfigError::NoMembers))
        ));
    }
}
