//! STRATUS management server process
//!
//! Wires the ownership services over the PostgreSQL store, runs the heartbeat
//! scan and transfer reap jobs, and serves `/health`, `/metrics` and
//! `/status` until a shutdown signal arrives.

pub mod config;
pub mod error;
pub mod node;
pub mod routes;
pub mod telemetry;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use node::{JobHandles, Services};
pub use routes::{router, AppState};
pub use telemetry::{init_tracing, NodeMetrics};
