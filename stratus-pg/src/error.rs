//! Mapping of driver and pool errors into `StratusError`.

use stratus_core::{EntityType, StorageError, StratusError};
use tokio_postgres::error::SqlState;

/// Query or statement failure.
pub(crate) fn query_failed(err: tokio_postgres::Error) -> StratusError {
    tracing::error!(error = ?err, "Database error");
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
    .into()
}

/// Failure to begin, commit or roll back.
pub(crate) fn transaction_failed(err: tokio_postgres::Error) -> StratusError {
    tracing::error!(error = ?err, "Database transaction error");
    StorageError::TransactionFailed {
        reason: err.to_string(),
    }
    .into()
}

/// Failure to check a connection out of the pool.
pub(crate) fn pool_failed(err: deadpool_postgres::PoolError) -> StratusError {
    tracing::error!(error = ?err, "Connection pool error");
    let reason = match err {
        deadpool_postgres::PoolError::Timeout(_) => "connection pool exhausted".to_string(),
        deadpool_postgres::PoolError::Closed => "connection pool is closed".to_string(),
        other => format!("failed to acquire connection: {other}"),
    };
    StorageError::Connection { reason }.into()
}

/// A stored value the domain types cannot represent.
pub(crate) fn corrupt_row(entity_type: EntityType, reason: impl Into<String>) -> StratusError {
    StorageError::CorruptRow {
        entity_type,
        reason: reason.into(),
    }
    .into()
}

/// SQLSTATE 23505.
pub(crate) fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}
