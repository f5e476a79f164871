//! Ownership compare-and-swap.
//!
//! Every ownership change between MS processes goes through one conditional
//! row update built here. The predicate always pins the host id and the status
//! the caller observed. Events that verify the requester also require the
//! stored owner to be null or the requester. Those events and the staleness
//! verdicts pin the observed heartbeat. When several processes race on the
//! same pre-image, at most one update matches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use stratus_core::{
    Clock, CoordinationError, Host, HostEvent, HostId, HostStatus, ManagementServerId,
    StatusTransitionTable, StratusResult,
};
use stratus_storage::{ConditionalUpdate, HostStore, OwnerChange, OwnershipCheck};

use crate::{CoordinationMetrics, HostLocks};

/// Result of one CAS attempt. Losing a race is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CasOutcome {
    /// Exactly one row changed
    Applied,
    /// The predicate no longer matched the stored row
    Raced,
    /// The event has no edge from the expected status; nothing was written
    NoTransition,
    /// The host does not exist
    NotFound,
}

impl CasOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied)
    }
}

impl fmt::Display for CasOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CasOutcome::Applied => "Applied",
            CasOutcome::Raced => "Raced",
            CasOutcome::NoTransition => "NoTransition",
            CasOutcome::NotFound => "NotFound",
        };
        f.write_str(value)
    }
}

pub struct OwnershipCas {
    store: Arc<dyn HostStore>,
    table: Arc<StatusTransitionTable>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CoordinationMetrics>,
    locks: HostLocks,
}

impl OwnershipCas {
    /// CAS over `store` with the standard transition table.
    pub fn new(
        store: Arc<dyn HostStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<CoordinationMetrics>,
    ) -> Self {
        Self {
            store,
            table: Arc::new(StatusTransitionTable::standard()),
            clock,
            metrics,
            locks: HostLocks::new(),
        }
    }

    pub fn with_table(mut self, table: Arc<StatusTransitionTable>) -> Self {
        self.table = table;
        self
    }

    pub fn store(&self) -> &Arc<dyn HostStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn metrics(&self) -> &Arc<CoordinationMetrics> {
        &self.metrics
    }

    pub fn table(&self) -> &StatusTransitionTable {
        &self.table
    }

    pub fn locks(&self) -> &HostLocks {
        &self.locks
    }

    /// Build the conditional update for moving `expected` to `next`.
    pub fn plan(
        &self,
        expected: &Host,
        event: HostEvent,
        next: HostStatus,
        requesting_ms: ManagementServerId,
    ) -> ConditionalUpdate {
        let ownership_check = event.check_management_server().then_some(OwnershipCheck {
            requester: requesting_ms,
        });

        let owner = if !event.updates_management_server() {
            OwnerChange::Keep
        } else if event.loses_connection() {
            OwnerChange::Release
        } else {
            OwnerChange::Assign(requesting_ms)
        };

        ConditionalUpdate {
            host_id: expected.id,
            expected_status: expected.status,
            expected_last_pinged: event.pins_heartbeat().then_some(expected.last_pinged),
            ownership_check,
            new_status: next,
            owner,
            last_pinged: event.is_liveness().then(|| self.clock.tick()),
            decommission: event.is_decommission(),
            now: self.clock.now(),
        }
    }

    /// Apply `event` against the caller's read of the host.
    ///
    /// `expected` supplies the status hint and, for events that pin it, the
    /// heartbeat the caller observed.
    pub async fn apply(
        &self,
        expected: &Host,
        event: HostEvent,
        requesting_ms: ManagementServerId,
    ) -> StratusResult<CasOutcome> {
        let Some(next) = self.table.next(expected.status, event) else {
            tracing::debug!(
                host_id = %expected.id,
                status = %expected.status,
                event = %event,
                "No transition for event"
            );
            self.metrics.record_outcome(CasOutcome::NoTransition);
            return Ok(CasOutcome::NoTransition);
        };

        let update = self.plan(expected, event, next, requesting_ms);
        let rows = match self.store.update_host_conditional(&update).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    host_id = %expected.id,
                    event = %event,
                    error = %e,
                    "Conditional host update failed"
                );
                return Err(e);
            }
        };

        let outcome = match rows {
            1 => CasOutcome::Applied,
            0 => match self.store.get_host(expected.id).await? {
                None => CasOutcome::NotFound,
                Some(_) => CasOutcome::Raced,
            },
            n => {
                CoordinationMetrics::incr(&self.metrics.integrity_violations);
                tracing::error!(
                    host_id = %expected.id,
                    from = %expected.status,
                    to = %next,
                    event = %event,
                    requester = %requesting_ms,
                    rows = n,
                    "Conditional host update changed more than one row"
                );
                return Err(CoordinationError::IntegrityViolation {
                    host_id: expected.id,
                    from: expected.status,
                    requester: update.requester(),
                    rows: n,
                }
                .into());
            }
        };

        self.metrics.record_outcome(outcome);
        match outcome {
            CasOutcome::Applied => tracing::debug!(
                host_id = %expected.id,
                from = %expected.status,
                to = %next,
                event = %event,
                requester = %requesting_ms,
                "Host transition applied"
            ),
            _ => tracing::debug!(
                host_id = %expected.id,
                expected_status = %expected.status,
                event = %event,
                requester = %requesting_ms,
                outcome = %outcome,
                "Host transition not applied"
            ),
        }
        Ok(outcome)
    }

    /// Read the host, then apply once.
    pub async fn apply_by_id(
        &self,
        host_id: HostId,
        event: HostEvent,
        requesting_ms: ManagementServerId,
    ) -> StratusResult<CasOutcome> {
        match self.store.get_host(host_id).await? {
            Some(host) => self.apply(&host, event, requesting_ms).await,
            None => {
                self.metrics.record_outcome(CasOutcome::NotFound);
                Ok(CasOutcome::NotFound)
            }
        }
    }

    /// Apply with up to `budget` re-reads after a lost race.
    ///
    /// Holds this process's advisory lock for the host while retrying. On
    /// exhaustion logs one warning with the stored row and returns `Raced`.
    pub async fn apply_with_retry(
        &self,
        host_id: HostId,
        event: HostEvent,
        requesting_ms: ManagementServerId,
        budget: u32,
    ) -> StratusResult<CasOutcome> {
        let _guard = self.locks.lock(host_id).await;
        let mut attempt = 0;
        loop {
            let Some(host) = self.store.get_host(host_id).await? else {
                self.metrics.record_outcome(CasOutcome::NotFound);
                return Ok(CasOutcome::NotFound);
            };

            let outcome = self.apply(&host, event, requesting_ms).await?;
            if outcome != CasOutcome::Raced {
                return Ok(outcome);
            }
            if attempt >= budget {
                self.report_exhausted(&host, event, requesting_ms, attempt + 1)
                    .await;
                return Ok(CasOutcome::Raced);
            }
            attempt += 1;
        }
    }

    async fn report_exhausted(
        &self,
        expected: &Host,
        event: HostEvent,
        requesting_ms: ManagementServerId,
        attempts: u32,
    ) {
        CoordinationMetrics::incr(&self.metrics.cas_retries_exhausted);
        let stored = self.store.get_host(expected.id).await.ok().flatten();
        tracing::warn!(
            host_id = %expected.id,
            event = %event,
            requester = %requesting_ms,
            attempts,
            attempted = ?self.table.next(expected.status, event),
            expected_status = %expected.status,
            expected_owner = ?expected.management_server_id,
            expected_last_pinged = %expected.last_pinged,
            stored_status = ?stored.as_ref().map(|h| h.status),
            stored_owner = ?stored.as_ref().and_then(|h| h.management_server_id),
            stored_last_pinged = ?stored.as_ref().map(|h| h.last_pinged.raw()),
            "Host transition retries exhausted"
        );
    }

    /// Fence every host owned by `owner` whose status is in `statuses`.
    ///
    /// Used when `owner` is known to be dead. Returns the number of hosts
    /// fenced; zero is a normal result.
    pub async fn mark_disconnected(
        &self,
        owner: ManagementServerId,
        statuses: &[HostStatus],
    ) -> StratusResult<u64> {
        let fenced = self
            .store
            .mark_hosts_disconnected(owner, statuses, self.clock.now())
            .await?;
        CoordinationMetrics::add(&self.metrics.hosts_fenced, fenced);
        if fenced > 0 {
            tracing::info!(owner = %owner, fenced, "Fenced hosts of management server");
        } else {
            tracing::debug!(owner = %owner, "No hosts to fence");
        }
        Ok(fenced)
    }

    /// Advance the host's command sequence.
    pub async fn next_sequence(&self, host_id: HostId) -> StratusResult<i64> {
        self.store.next_sequence(host_id).await
    }
}

impl fmt::Debug for OwnershipCas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipCas")
            .field("edges", &self.table.len())
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use stratus_core::HeartbeatTick;
    use stratus_test_utils::{assertions, fixtures, generators};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Whatever sequence of events and requesters is applied, the stored
        /// host keeps its owner column consistent with its status.
        #[test]
        fn prop_cas_preserves_ownership_invariant(
            start in generators::arb_host_status(),
            steps in prop::collection::vec((generators::arb_host_event(), 0usize..3), 1..30),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let servers = [fixtures::ms(), fixtures::ms(), fixtures::ms()];
            let clock = Arc::new(fixtures::manual_clock());
            let host = fixtures::host_in(start, servers[0], HeartbeatTick::ZERO);
            let store = Arc::new(fixtures::store_with([host.clone()]));
            let cas = OwnershipCas::new(
                store.clone(),
                clock.clone(),
                Arc::new(CoordinationMetrics::new()),
            );

            rt.block_on(async {
                for (event, who) in steps {
                    clock.advance(std::time::Duration::from_millis(1500));
                    let current = store.get_host(host.id).await.unwrap().unwrap();
                    let outcome = cas.apply(&current, event, servers[who]).await.unwrap();
                    let after = store.get_host(host.id).await.unwrap().unwrap();
                    assertions::assert_ownership_consistent(&after);
                    if outcome == CasOutcome::NoTransition {
                        assert_eq!(after, current);
                    }
                }
            });
        }

        /// A pair absent from the table is reported and never written.
        #[test]
        fn prop_absent_pairs_report_no_transition(
            host in generators::arb_consistent_host(),
            event in generators::arb_host_event(),
        ) {
            let table = StatusTransitionTable::standard();
            prop_assume!(table.next(host.status, event).is_none());
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = Arc::new(fixtures::store_with([host.clone()]));
            let cas = OwnershipCas::new(
                store.clone(),
                Arc::new(fixtures::manual_clock()),
                Arc::new(CoordinationMetrics::new()),
            );

            let outcome = rt.block_on(cas.apply(&host, event, fixtures::ms())).unwrap();
            let after = rt.block_on(store.get_host(host.id)).unwrap().unwrap();

            prop_assert_eq!(outcome, CasOutcome::NoTransition);
            prop_assert_eq!(after, host);
        }
    }
}
