//! Error type for the node process.

use stratus_core::{ConfigError, StratusError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Stratus(#[from] StratusError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background job panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Failed to initialise tracing: {0}")]
    Telemetry(String),
}

impl From<ConfigError> for NodeError {
    fn from(err: ConfigError) -> Self {
        NodeError::Stratus(err.into())
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
