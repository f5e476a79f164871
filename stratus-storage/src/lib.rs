//! STRATUS Storage - Store Traits and Mock Implementation
//!
//! Defines the storage abstraction for host and transfer records.
//! The PostgreSQL implementation lives in stratus-pg.

pub mod traits;
pub mod update;

pub use traits::{HostStore, TransferStore};
pub use update::{ConditionalUpdate, OwnerChange, OwnershipCheck};

use ::async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use stratus_core::{
    CoordinationError, EntityIdType, EntityType, HeartbeatTick, Host, HostId, HostStatus,
    ManagementServerId, StorageError, StratusError, StratusResult, Timestamp, TransferRecord,
    TransferState,
};

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// In-memory store for tests and single-process simulations.
///
/// Every trait method takes the table lock once, so each call is atomic just
/// like the single-statement updates of the PostgreSQL store.
#[derive(Debug, Default, Clone)]
pub struct MockStorage {
    hosts: Arc<RwLock<HashMap<HostId, Host>>>,
    transfers: Arc<RwLock<HashMap<HostId, TransferRecord>>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read().map_err(|_| StorageError::LockPoisoned)
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write().map_err(|_| StorageError::LockPoisoned)
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with hosts, replacing any with the same id.
    pub fn with_hosts(self, hosts: impl IntoIterator<Item = Host>) -> StratusResult<Self> {
        {
            let mut table = write(&self.hosts)?;
            for host in hosts {
                table.insert(host.id, host);
            }
        }
        Ok(self)
    }

    pub fn transfer_count(&self) -> StratusResult<usize> {
        Ok(read(&self.transfers)?.len())
    }

    /// All hosts, for invariant checks in tests.
    pub fn all_hosts(&self) -> StratusResult<Vec<Host>> {
        Ok(read(&self.hosts)?.values().cloned().collect())
    }
}

#[async_trait]
impl HostStore for MockStorage {
    async fn get_host(&self, id: HostId) -> StratusResult<Option<Host>> {
        Ok(read(&self.hosts)?.get(&id).cloned())
    }

    async fn find_stale_hosts(
        &self,
        statuses: &[HostStatus],
        cutoff: HeartbeatTick,
        limit: usize,
    ) -> StratusResult<Vec<Host>> {
        let hosts = read(&self.hosts)?;
        let mut stale: Vec<Host> = hosts
            .values()
            .filter(|h| statuses.contains(&h.status) && h.last_pinged < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|h| (h.last_pinged, h.id));
        stale.truncate(limit);
        Ok(stale)
    }

    async fn list_hosts_by_owner(&self, owner: ManagementServerId) -> StratusResult<Vec<Host>> {
        let hosts = read(&self.hosts)?;
        Ok(hosts
            .values()
            .filter(|h| h.is_owned_by(owner))
            .cloned()
            .collect())
    }

    async fn insert_host(&self, host: &Host) -> StratusResult<()> {
        let mut hosts = write(&self.hosts)?;
        if hosts.contains_key(&host.id) {
            return Err(StratusError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Host,
                reason: "already exists".to_string(),
            }));
        }
        hosts.insert(host.id, host.clone());
        Ok(())
    }

    async fn update_host_conditional(&self, update: &ConditionalUpdate) -> StratusResult<u64> {
        let mut hosts = write(&self.hosts)?;
        match hosts.get_mut(&update.host_id) {
            Some(host) if update.matches(host) => {
                update.apply_to(host);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn mark_hosts_disconnected(
        &self,
        owner: ManagementServerId,
        statuses: &[HostStatus],
        now: Timestamp,
    ) -> StratusResult<u64> {
        let mut hosts = write(&self.hosts)?;
        let mut fenced = 0;
        for host in hosts
            .values_mut()
            .filter(|h| h.is_owned_by(owner) && statuses.contains(&h.status))
        {
            host.status = HostStatus::Disconnected;
            host.management_server_id = None;
            host.disconnected_on = Some(now);
            host.updated_at = now;
            fenced += 1;
        }
        Ok(fenced)
    }

    async fn next_sequence(&self, id: HostId) -> StratusResult<i64> {
        let mut hosts = write(&self.hosts)?;
        let host = hosts.get_mut(&id).ok_or(StorageError::NotFound {
            entity_type: EntityType::Host,
            id: id.as_uuid(),
        })?;
        host.sequence += 1;
        Ok(host.sequence)
    }

    async fn health_check(&self) -> StratusResult<()> {
        let _hosts = read(&self.hosts)?;
        Ok(())
    }
}

#[async_trait]
impl TransferStore for MockStorage {
    async fn insert_transfer(&self, record: &TransferRecord) -> StratusResult<()> {
        let mut transfers = write(&self.transfers)?;
        if transfers.contains_key(&record.host_id) {
            return Err(CoordinationError::DuplicateTransfer {
                host_id: record.host_id,
            }
            .into());
        }
        transfers.insert(record.host_id, record.clone());
        Ok(())
    }

    async fn get_transfer(&self, host_id: HostId) -> StratusResult<Option<TransferRecord>> {
        Ok(read(&self.transfers)?.get(&host_id).cloned())
    }

    async fn update_transfer_state(
        &self,
        host_id: HostId,
        expected: TransferState,
        new: TransferState,
        now: Timestamp,
    ) -> StratusResult<u64> {
        let mut transfers = write(&self.transfers)?;
        match transfers.get_mut(&host_id) {
            Some(record) if record.state == expected => {
                record.state = new;
                record.updated = now;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_transfer(&self, host_id: HostId) -> StratusResult<u64> {
        Ok(write(&self.transfers)?.remove(&host_id).map_or(0, |_| 1))
    }

    async fn delete_transfer_created_before(
        &self,
        host_id: HostId,
        cutoff: Timestamp,
    ) -> StratusResult<u64> {
        let mut transfers = write(&self.transfers)?;
        let stale = transfers
            .get(&host_id)
            .is_some_and(|record| record.is_older_than(cutoff));
        if stale {
            transfers.remove(&host_id);
        }
        Ok(u64::from(stale))
    }

    async fn list_transfers_by_initial_owner(
        &self,
        owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>> {
        let transfers = read(&self.transfers)?;
        Ok(transfers
            .values()
            .filter(|t| t.initial_owner == owner)
            .cloned()
            .collect())
    }

    async fn list_transfers_by_future_owner(
        &self,
        owner: ManagementServerId,
    ) -> StratusResult<Vec<TransferRecord>> {
        let transfers = read(&self.transfers)?;
        Ok(transfers
            .values()
            .filter(|t| t.future_owner == owner)
            .cloned()
            .collect())
    }

    async fn find_transfers_created_before(
        &self,
        cutoff: Timestamp,
    ) -> StratusResult<Vec<TransferRecord>> {
        let transfers = read(&self.transfers)?;
        let mut stale: Vec<TransferRecord> = transfers
            .values()
            .filter(|t| t.is_older_than(cutoff))
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.created);
        Ok(stale)
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use stratus_core::DataCenterId;

    fn any_status() -> impl Strategy<Value = HostStatus> {
        proptest::sample::select(HostStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// find_stale_hosts never returns a host outside the requested
        /// statuses or at/after the cutoff.
        #[test]
        fn prop_find_stale_respects_filters(
            rows in prop::collection::vec((any_status(), 0i64..100), 0..30),
            cutoff in 0i64..100,
        ) {
            let hosts: Vec<Host> = rows
                .into_iter()
                .map(|(status, tick)| {
                    let owner = status.is_owned().then(ManagementServerId::now_v7);
                    Host::new("kvm", DataCenterId::now_v7(), Utc::now())
                        .with_state(status, owner, HeartbeatTick::from_raw(tick))
                })
                .collect();
            let storage = MockStorage::new().with_hosts(hosts.clone()).unwrap();
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let stale = rt
                .block_on(storage.find_stale_hosts(
                    &HostStatus::LIVE,
                    HeartbeatTick::from_raw(cutoff),
                    usize::MAX,
                ))
                .unwrap();

            let expected = hosts
                .iter()
                .filter(|h| h.status.is_live() && h.last_pinged.raw() < cutoff)
                .count();
            prop_assert_eq!(stale.len(), expected);
            for host in stale {
                prop_assert!(host.status.is_live());
                prop_assert!(host.last_pinged.raw() < cutoff);
            }
        }

        /// A conditional update changes at most one row and never when the
        /// expected status differs from the stored one.
        #[test]
        fn prop_conditional_update_requires_expected_status(
            stored in any_status(),
            expected in any_status(),
        ) {
            let host = Host::new("kvm", DataCenterId::now_v7(), Utc::now()).with_state(
                stored,
                None,
                HeartbeatTick::ZERO,
            );
            let storage = MockStorage::new().with_hosts([host.clone()]).unwrap();
            let update = ConditionalUpdate {
                host_id: host.id,
                expected_status: expected,
                expected_last_pinged: None,
                ownership_check: None,
                new_status: HostStatus::Alert,
                owner: OwnerChange::Keep,
                last_pinged: None,
                decommission: false,
                now: Utc::now(),
            };
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let rows = rt.block_on(storage.update_host_conditional(&update)).unwrap();

            prop_assert_eq!(rows, u64::from(stored == expected));
        }
    }
}
