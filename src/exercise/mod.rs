//! Exercise state: inject store, lifecycle, command folds and the read
//! model, driven by [`ExerciseEngine`] and owned by [`DashboardSession`].

mod engine;
pub mod fold;
mod inject_store;
mod lifecycle;
mod read_model;
mod session;


pub use engine::ExerciseEngine;
pub use fold::{CommandParams, DashboardVariant, DerivedState, FoldEngine, FoldFn, FoldTable};
pub use inject_store::InjectStore;
pub use lifecycle::{ExerciseState, Lifecycle, LifecycleConfig};
pub use read_model::{ReadModel, Snapshot};
pub use session::{build_command_inject, DashboardSession, SessionConfig};
