//! Domain models: attributes, states, members, commands, events, config.

pub mod attribute;
pub mod command;
pub mod config;
pub mod event;
pub mod member;
pub mod state;

pub use attribute::{AttrMap, AttrValue, Attribute, HvacMode};
pub use command::{Actor, BatchTag, CausalContext, Command, CommandKind};
pub use config::{
    AggregationConfig, AverageMethod, GroupConfig, LoggingConfig, ModeStrategy, RoundMethod,
    ScheduleConfig, SyncConfig, SyncMode, TimingConfig, WindowConfig,
};
pub use event::{MemberEvent, SensorEvent};
pub use member::{MemberId, MemberSnapshot, SensorId, ZoneId};
pub use state::{AttrFilter, StateDelta, TargetState};
