//! Domain-level error taxonomy.
//!
//! Rejected writes are a boolean outcome, not an error. Dispatch failures
//! are retried and then logged, never surfaced to callers. What remains
//! here are the port-level failures and the one-time setup checks.

use thiserror::Error;

use super::models::member::MemberId;

/// Errors returned by the outbound command execution port.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("member unavailable: {0}")]
    Unavailable(MemberId),

    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Configuration inconsistencies, surfaced once at setup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("group has no members configured")]
    NoMembers,

    #[error("duplicate member id: {0}")]
    DuplicateMember(MemberId),

    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
}

/// Errors from the snapshot store port.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state store io failure")]
    Io(#[from] std::io::Error),

    #[error("state snapshot serialization failure")]
    Serde(#[from] serde_json::Error),
}
