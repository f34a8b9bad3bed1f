//! The reconciliation engine: state cell, policies, dispatcher,
//! classifier, suppression controller, schedule and group orchestration.

pub mod aggregator;
pub mod dispatcher;
pub mod group;
pub mod policy;
pub mod schedule;
pub mod state_cell;
pub mod sync_engine;
pub mod window;

pub use aggregator::{Aggregator, GroupView};
pub use dispatcher::CommandDispatcher;
pub use group::GroupService;
pub use policy::{ActorPolicy, CommandPolicy, PolicyContext, RestorePolicy, SchedulePolicy, SyncPolicy, WindowPolicy};
pub use schedule::{ScheduleService, ScheduleTrigger};
pub use state_cell::StateCell;
pub use sync_engine::{ChangeOutcome, StartupGate, SyncEngine};
pub use window::WindowSuppressor;
