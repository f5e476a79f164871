//! Per-host advisory locks.
//!
//! Serialises work on one host inside a single MS process so two tasks of the
//! same process do not retry the same CAS against each other. These locks mean
//! nothing to other MS processes; cross-process safety comes only from the
//! conditional row update.
//!
//! An entry lives only while someone holds or waits on it. Releasing the last
//! guard removes the entry, so the map is bounded by the hosts in flight.

use dashmap::DashMap;
use std::sync::Arc;
use stratus_core::HostId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct HostLocks {
    locks: DashMap<HostId, Arc<Mutex<()>>>,
}

/// Held lock on one host. Dropping it releases the lock.
#[derive(Debug)]
pub struct HostLockGuard<'a> {
    locks: &'a HostLocks,
    host_id: HostId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HostLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Runs under the shard lock, so no one can clone the entry between
        // the count check and the removal.
        self.locks
            .locks
            .remove_if(&self.host_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl HostLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, host_id: HostId) -> Arc<Mutex<()>> {
        // The shard guard is released at the end of this statement, before
        // anyone awaits the mutex.
        Arc::clone(&self.locks.entry(host_id).or_default())
    }

    fn guard(&self, host_id: HostId, guard: Option<OwnedMutexGuard<()>>) -> HostLockGuard<'_> {
        HostLockGuard {
            locks: self,
            host_id,
            guard,
        }
    }

    /// Wait for the host's lock.
    pub async fn lock(&self, host_id: HostId) -> HostLockGuard<'_> {
        let guard = self.entry(host_id).lock_owned().await;
        self.guard(host_id, Some(guard))
    }

    /// Take the host's lock if nobody in this process holds it.
    pub fn try_lock(&self, host_id: HostId) -> Option<HostLockGuard<'_>> {
        let guard = self.entry(host_id).try_lock_owned().ok()?;
        Some(self.guard(host_id, Some(guard)))
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::EntityIdType;

    #[tokio::test]
    async fn test_same_host_is_exclusive() {
        let locks = HostLocks::new();
        let host = HostId::now_v7();

        let guard = locks.lock(host).await;
        assert!(locks.try_lock(host).is_none());
        drop(guard);
        assert!(locks.try_lock(host).is_some());
    }

    #[tokio::test]
    async fn test_different_hosts_do_not_contend() {
        let locks = HostLocks::new();
        let _a = locks.lock(HostId::now_v7()).await;
        assert!(locks.try_lock(HostId::now_v7()).is_some());
    }

    #[tokio::test]
    async fn test_released_entries_are_removed() {
        let locks = HostLocks::new();
        let held = HostId::now_v7();
        let guard = locks.lock(held).await;
        drop(locks.lock(HostId::now_v7()).await);
        assert_eq!(locks.len(), 1);

        assert!(locks.try_lock(held).is_none());
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(HostLocks::new());
        let host = HostId::now_v7();
        let guard = locks.lock(host).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(host).await;
            })
        };
        tokio::task::yield_now().await;
        drop(guard);
        waiter.await.unwrap();

        assert!(locks.is_empty());
    }
}
