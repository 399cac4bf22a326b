//! Shared data types: injects as delivered by the bus and the derived
//! domain entities the fold engine maintains.

mod domain;
mod inject;

pub use domain::*;
pub use inject::*;
