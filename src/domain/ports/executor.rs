//! Command execution port - interface to the device transport.

use async_trait::async_trait;

use crate::domain::error::ExecutorError;
use crate::domain::models::command::{BatchTag, Command};

/// Executes one outbound command against a set of members.
///
/// Implementations are expected to propagate the batch tag into whatever
/// causality mechanism the transport offers, so that resulting member
/// events can carry it back as a [`CausalContext`].
///
/// [`CausalContext`]: crate::domain::models::command::CausalContext
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute the command. A failure means the batch will be retried as
    /// a whole; implementations should not retry internally.
    async fn execute(&self, command: &Command, tag: &BatchTag) -> Result<(), ExecutorError>;
}
