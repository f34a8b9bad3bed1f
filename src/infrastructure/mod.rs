//! Infrastructure layer: config loading, logging, persistence and
//! in-memory adapters.

pub mod config;
pub mod logging;
pub mod mock;
pub mod store;

pub use config::{ConfigLoadError, ConfigLoader};
pub use mock::{FixedSchedule, InMemoryRegistry, LoopbackExecutor};
pub use store::JsonStateStore;
