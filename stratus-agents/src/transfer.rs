//! Ownership transfer coordination.
//!
//! # State Transition Diagram
//!
//! ```text
//! open() → TransferRequested ── mark_started() ──→ TransferStarted ── complete() → (deleted)
//!                 └──────────────── abandon() / reaper ─────────────────────→ (deleted)
//! ```
//!
//! Records are advisory. They never change a host's owner; the owner moves
//! only through the ownership CAS. A stuck record can delay a hand-off until
//! the reaper removes it, but cannot split ownership.

use std::sync::Arc;
use std::time::Duration;
use stratus_core::{
    Clock, CoordinationError, HostId, ManagementServerId, StratusResult, Timestamp,
    TransferRecord, TransferState, ValidationError,
};
use stratus_storage::TransferStore;

use crate::CoordinationMetrics;

pub struct TransferCoordinator {
    store: Arc<dyn TransferStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CoordinationMetrics>,
}

impl TransferCoordinator {
    pub fn new(
        store: Arc<dyn TransferStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<CoordinationMetrics>,
    ) -> Self {
        Self {
            store,
            clock,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<CoordinationMetrics> {
        &self.metrics
    }

    /// Open a transfer of `host_id` from `initial_owner` to `future_owner`.
    pub async fn open(
        &self,
        host_id: HostId,
        initial_owner: ManagementServerId,
        future_owner: ManagementServerId,
    ) -> StratusResult<TransferRecord> {
        if initial_owner == future_owner {
            return Err(ValidationError::InvalidValue {
                field: "future_owner".to_string(),
                reason: format!("host {host_id} is already owned by {future_owner}"),
            }
            .into());
        }

        let record =
            TransferRecord::requested(host_id, initial_owner, future_owner, self.clock.now());
        self.store.insert_transfer(&record).await?;
        CoordinationMetrics::incr(&self.metrics.transfers_opened);
        tracing::info!(
            host_id = %host_id,
            initial_owner = %initial_owner,
            future_owner = %future_owner,
            "Transfer opened"
        );
        Ok(record)
    }

    /// Move the record to `TransferStarted`. Called by the current owner.
    pub async fn mark_started(&self, host_id: HostId) -> StratusResult<()> {
        let rows = self
            .store
            .update_transfer_state(
                host_id,
                TransferState::TransferRequested,
                TransferState::TransferStarted,
                self.clock.now(),
            )
            .await?;
        if rows == 1 {
            tracing::debug!(host_id = %host_id, "Transfer started");
            return Ok(());
        }

        match self.store.get_transfer(host_id).await? {
            None => Err(CoordinationError::TransferNotFound { host_id }.into()),
            Some(record) => Err(CoordinationError::InvalidTransferState {
                host_id,
                expected: TransferState::TransferRequested,
                actual: record.state,
            }
            .into()),
        }
    }

    /// Delete the record once the future owner holds the host.
    /// Completing a missing record succeeds.
    pub async fn complete(&self, host_id: HostId) -> StratusResult<()> {
        let rows = self.store.delete_transfer(host_id).await?;
        if rows > 0 {
            CoordinationMetrics::incr(&self.metrics.transfers_completed);
            tracing::info!(host_id = %host_id, "Transfer completed");
        } else {
            tracing::debug!(host_id = %host_id, "Transfer already gone");
        }
        Ok(())
    }

    /// Delete the record regardless of its state. Returns whether one existed.
    pub async fn abandon(&self, host_id: HostId) -> StratusResult<bool> {
        let existed = self.store.delete_transfer(host_id).await? > 0;
        if existed {
            CoordinationMetrics::incr(&self.metrics.transfers_abandoned);
            tracing::warn!(host_id = %host_id, "Transfer abandoned");
        }
        Ok(existed)
    }

    /// Transfers whose current owner is `current_owner`.
    pub async fn list_outgoing(
        &self,
        current_owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>> {
        self.store
            .list_transfers_by_initial_owner(current_owner)
            .await
    }

    /// Transfers heading to `future_owner`.
    pub async fn list_incoming(
        &self,
        future_owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>> {
        self.store.list_transfers_by_future_owner(future_owner).await
    }

    /// Records created before `cutoff`.
    pub async fn find_stale(&self, cutoff: Timestamp) -> StratusResult<Vec<TransferRecord>> {
        self.store.find_transfers_created_before(cutoff).await
    }

    pub async fn find_active(&self, host_id: HostId) -> StratusResult<Option<TransferRecord>> {
        self.store.get_transfer(host_id).await
    }

    /// Abandon every record older than `timeout`. Returns how many were removed.
    ///
    /// The delete re-checks the age, so a record completed and reopened since
    /// the query survives.
    pub async fn reap_stale(&self, timeout: Duration) -> StratusResult<usize> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(timeout)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let mut reaped = 0;
        for record in self.find_stale(cutoff).await? {
            let rows = self
                .store
                .delete_transfer_created_before(record.host_id, cutoff)
                .await?;
            if rows > 0 {
                reaped += 1;
                CoordinationMetrics::incr(&self.metrics.transfers_abandoned);
                tracing::warn!(
                    host_id = %record.host_id,
                    initial_owner = %record.initial_owner,
                    future_owner = %record.future_owner,
                    state = %record.state,
                    created = %record.created,
                    "Reaped stale transfer"
                );
            }
        }
        Ok(reaped)
    }
}

impl std::fmt::Debug for TransferCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferCoordinator").finish_non_exhaustive()
    }
}
