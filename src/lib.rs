//! Thermoflock - Thermostat Group Reconciliation Engine
//!
//! Thermoflock aggregates N independently-addressable thermostats into
//! one logical unit and keeps them converged on a single target state
//! despite per-device latency, partial failures, manual overrides and
//! devices echoing back acknowledgments of commands this process issued.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure models, port traits and errors
//! - **Service Layer** (`services`): The reconciliation engine
//! - **Infrastructure Layer** (`infrastructure`): Config, logging,
//!   persistence and in-memory adapters
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use thermoflock::services::GroupService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire a GroupService against your transport adapters and feed
//!     // it member events.
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Actor, AttrFilter, AttrMap, AttrValue, Attribute, BatchTag, CausalContext, Command,
    CommandKind, GroupConfig, HvacMode, MemberEvent, MemberId, MemberSnapshot, SensorEvent,
    SensorId, StateDelta, SyncMode, TargetState, ZoneId,
};
pub use domain::ports::{CommandExecutor, MemberRegistry, ScheduleSource, StateStore};
pub use infrastructure::config::{ConfigLoadError, ConfigLoader};
pub use services::{ChangeOutcome, CommandDispatcher, GroupService, StateCell};
