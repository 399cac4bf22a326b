#![deny(unreachable_pub)]

// Core modules
mod consts;
mod errors;
mod prelude;

// Shared utilities
pub mod config;
pub mod logging;
pub mod types;

// Feature modules
pub mod exercise;
pub mod ws;

// Re-exports
pub use config::{AppConfig, BusConfig, IdentityConfig};
pub use consts::{
    DEFAULT_NOISE_FLOOR_DBM, DEFAULT_SPECTRUM_BINS, DEFAULT_SPECTRUM_END_MHZ,
    DEFAULT_SPECTRUM_START_MHZ, LOCAL_BUS_URL, SIGNAL_HISTORY_LIMIT, TRIGGER_INJECT_TYPE,
};
pub use errors::Error;
pub use exercise::{
    build_command_inject, DashboardSession, DashboardVariant, DerivedState, ExerciseEngine,
    ExerciseState, ReadModel, SessionConfig, Snapshot,
};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use prelude::Result;
pub use types::*;
pub use ws::{
    BusEvent, ConnectionManager, ConnectionState, DashboardRole, ExerciseIdentity, Message,
    ReconnectionConfig, TopicSet,
};
