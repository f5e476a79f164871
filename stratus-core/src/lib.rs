//! STRATUS Core - Entity Types
//!
//! Data structures shared by every other crate: typed ids, host and transfer
//! records, the status transition table, the heartbeat clock, configuration
//! and the error taxonomy. No I/O lives here.

mod clock;
mod config;
mod entities;
mod enums;
mod error;
mod identity;
mod transition;

pub use clock::*;
pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
pub use transition::*;
