//! Error types for STRATUS operations

use crate::{EntityType, HostId, HostStatus, ManagementServerId, TransferState};
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Connection error: {reason}")]
    Connection { reason: String },

    #[error("Corrupt row in {entity_type:?}: {reason}")]
    CorruptRow { entity_type: EntityType, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Ownership coordination errors.
///
/// Losing a CAS race is not an error; see `CasOutcome` in the agents crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("Transfer already open for host {host_id}")]
    DuplicateTransfer { host_id: HostId },

    #[error("No transfer open for host {host_id}")]
    TransferNotFound { host_id: HostId },

    #[error("Transfer for host {host_id} is {actual}, expected {expected}")]
    InvalidTransferState {
        host_id: HostId,
        expected: TransferState,
        actual: TransferState,
    },

    #[error(
        "Integrity violation: conditional update of host {host_id} ({from} by {requester:?}) changed {rows} rows"
    )]
    IntegrityViolation {
        host_id: HostId,
        from: HostStatus,
        requester: Option<ManagementServerId>,
        rows: u64,
    },
}

/// Master error type for all STRATUS errors.
#[derive(Debug, Clone, Error)]
pub enum StratusError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),
}

/// Result type alias for STRATUS operations.
pub type StratusResult<T> = Result<T, StratusError>;

// =============================================================================
// TESTS
// =============================================================================
