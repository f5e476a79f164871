//! Async store traits.
//!
//! One statically-typed method per access pattern the coordination core
//! needs. Implementations must make `update_host_conditional` a single atomic
//! row operation; it is the only synchronisation between MS processes.

use ::async_trait::async_trait;
use stratus_core::{
    HeartbeatTick, Host, HostId, HostStatus, ManagementServerId, StratusResult, Timestamp,
    TransferRecord, TransferState,
};

use crate::ConditionalUpdate;

/// Durable table of host records.
#[async_trait]
pub trait HostStore: Send + Sync {
    // ========================================================================
    // READS
    // ========================================================================

    /// Get a host by id. Removed hosts are still returned.
    async fn get_host(&self, id: HostId) -> StratusResult<Option<Host>>;

    /// Hosts in one of `statuses` whose heartbeat is strictly older than
    /// `cutoff`, oldest first, at most `limit` of them.
    async fn find_stale_hosts(
        &self,
        statuses: &[HostStatus],
        cutoff: HeartbeatTick,
        limit: usize,
    ) -> StratusResult<Vec<Host>>;

    /// Hosts currently owned by `owner`.
    async fn list_hosts_by_owner(&self, owner: ManagementServerId) -> StratusResult<Vec<Host>>;

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Register a new host.
    async fn insert_host(&self, host: &Host) -> StratusResult<()>;

    /// Apply `update` if and only if its predicate matches the stored row.
    ///
    /// Returns the number of rows changed: 1 on success, 0 when the predicate
    /// did not match. Any larger count means the store is corrupt.
    async fn update_host_conditional(&self, update: &ConditionalUpdate) -> StratusResult<u64>;

    /// Clear ownership of every host owned by `owner` whose status is in
    /// `statuses`, setting them `Disconnected`. Returns the number fenced.
    async fn mark_hosts_disconnected(
        &self,
        owner: ManagementServerId,
        statuses: &[HostStatus],
        now: Timestamp,
    ) -> StratusResult<u64>;

    /// Atomically advance and return the host's command sequence.
    async fn next_sequence(&self, id: HostId) -> StratusResult<i64>;

    /// Cheap round trip used by health checks.
    async fn health_check(&self) -> StratusResult<()>;
}

/// Table of in-flight ownership transfer records, keyed by host.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert a new record. Fails with `CoordinationError::DuplicateTransfer`
    /// when the host already has one.
    async fn insert_transfer(&self, record: &TransferRecord) -> StratusResult<()>;

    async fn get_transfer(&self, host_id: HostId) -> StratusResult<Option<TransferRecord>>;

    /// Move the record from `expected` to `new` state. Returns rows changed.
    async fn update_transfer_state(
        &self,
        host_id: HostId,
        expected: TransferState,
        new: TransferState,
        now: Timestamp,
    ) -> StratusResult<u64>;

    /// Delete the record. Returns rows deleted (0 when absent).
    async fn delete_transfer(&self, host_id: HostId) -> StratusResult<u64>;

    /// Delete the record only if it was created before `cutoff`.
    async fn delete_transfer_created_before(
        &self,
        host_id: HostId,
        cutoff: Timestamp,
    ) -> StratusResult<u64>;

    async fn list_transfers_by_initial_owner(
        &self,
        owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>>;

    async fn list_transfers_by_future_owner(
        &self,
        owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>>;

    /// Records created strictly before `cutoff`, oldest first.
    async fn find_transfers_created_before(
        &self,
        cutoff: Timestamp,
    ) -> StratusResult<Vec<TransferRecord>>;
}
