//! STRATUS PostgreSQL store
//!
//! Implements `HostStore` and `TransferStore` over a deadpool-postgres pool.
//! Every conditional host update is one `UPDATE ... WHERE` statement inside
//! its own transaction, so the row lock taken by PostgreSQL is the only
//! synchronisation between management server processes.

mod config;
mod error;
mod rows;
mod statement;
mod store;

pub use config::DbConfig;
pub use store::{PgStore, MIGRATION};
