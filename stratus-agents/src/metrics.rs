//! Coordination counters.
//!
//! Constructed once at start-up and shared by `Arc`; nothing here is global.
//! The node mirrors snapshots into its Prometheus registry.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::CasOutcome;

/// Counters for CAS outcomes and background job activity.
#[derive(Debug, Default)]
pub struct CoordinationMetrics {
    /// Conditional updates that changed the row
    pub cas_applied: AtomicU64,

    /// Conditional updates that lost to a concurrent writer
    pub cas_raced: AtomicU64,

    /// Events with no edge from the expected status
    pub cas_no_transition: AtomicU64,

    /// Updates addressed to a host that does not exist
    pub cas_not_found: AtomicU64,

    /// `apply_with_retry` calls that ran out of budget
    pub cas_retries_exhausted: AtomicU64,

    /// Conditional updates that changed more than one row
    pub integrity_violations: AtomicU64,

    /// Hosts fenced by `mark_disconnected`
    pub hosts_fenced: AtomicU64,

    /// Heartbeat scans completed
    pub scan_cycles: AtomicU64,

    /// Stale hosts returned by scans
    pub stale_hosts_found: AtomicU64,

    /// Errors during heartbeat scans
    pub scan_errors: AtomicU64,

    /// Transfer records opened
    pub transfers_opened: AtomicU64,

    /// Transfer records completed by the future owner
    pub transfers_completed: AtomicU64,

    /// Transfer records abandoned by the reaper or explicitly
    pub transfers_abandoned: AtomicU64,

    /// Reap passes completed
    pub reap_cycles: AtomicU64,

    /// Errors during reap passes
    pub reap_errors: AtomicU64,
}

impl CoordinationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Count a CAS outcome.
    pub fn record_outcome(&self, outcome: CasOutcome) {
        let counter = match outcome {
            CasOutcome::Applied => &self.cas_applied,
            CasOutcome::Raced => &self.cas_raced,
            CasOutcome::NoTransition => &self.cas_no_transition,
            CasOutcome::NotFound => &self.cas_not_found,
        };
        Self::incr(counter);
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> CoordinationSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CoordinationSnapshot {
            cas_applied: load(&self.cas_applied),
            cas_raced: load(&self.cas_raced),
            cas_no_transition: load(&self.cas_no_transition),
            cas_not_found: load(&self.cas_not_found),
            cas_retries_exhausted: load(&self.cas_retries_exhausted),
            integrity_violations: load(&self.integrity_violations),
            hosts_fenced: load(&self.hosts_fenced),
            scan_cycles: load(&self.scan_cycles),
            stale_hosts_found: load(&self.stale_hosts_found),
            scan_errors: load(&self.scan_errors),
            transfers_opened: load(&self.transfers_opened),
            transfers_completed: load(&self.transfers_completed),
            transfers_abandoned: load(&self.transfers_abandoned),
            reap_cycles: load(&self.reap_cycles),
            reap_errors: load(&self.reap_errors),
        }
    }
}

/// Snapshot of coordination metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinationSnapshot {
    pub cas_applied: u64,
    pub cas_raced: u64,
    pub cas_no_transition: u64,
    pub cas_not_found: u64,
    pub cas_retries_exhausted: u64,
    pub integrity_violations: u64,
    pub hosts_fenced: u64,
    pub scan_cycles: u64,
    pub stale_hosts_found: u64,
    pub scan_errors: u64,
    pub transfers_opened: u64,
    pub transfers_completed: u64,
    pub transfers_abandoned: u64,
    pub reap_cycles: u64,
    pub reap_errors: u64,
}

impl CoordinationSnapshot {
    /// `(name, help, value)` for every counter, in a stable order.
    pub fn counters(&self) -> [(&'static str, &'static str, u64); 15] {
        [
            ("cas_applied", "Conditional host updates applied", self.cas_applied),
            ("cas_raced", "Conditional host updates lost to a concurrent writer", self.cas_raced),
            (
                "cas_no_transition",
                "Events with no transition from the expected status",
                self.cas_no_transition,
            ),
            (
                "cas_not_found",
                "Conditional updates addressed to a missing host",
                self.cas_not_found,
            ),
            (
                "cas_retries_exhausted",
                "Retried updates that ran out of budget",
                self.cas_retries_exhausted,
            ),
            (
                "integrity_violations",
                "Conditional updates that changed more than one row",
                self.integrity_violations,
            ),
            ("hosts_fenced", "Hosts disconnected by bulk fencing", self.hosts_fenced),
            ("scan_cycles", "Heartbeat scans completed", self.scan_cycles),
            (
                "stale_hosts_found",
                "Stale hosts returned by heartbeat scans",
                self.stale_hosts_found,
            ),
            ("scan_errors", "Errors during heartbeat scans", self.scan_errors),
            ("transfers_opened", "Ownership transfers opened", self.transfers_opened),
            ("transfers_completed", "Ownership transfers completed", self.transfers_completed),
            ("transfers_abandoned", "Ownership transfers abandoned", self.transfers_abandoned),
            ("reap_cycles", "Transfer reap passes completed", self.reap_cycles),
            ("reap_errors", "Errors during transfer reap passes", self.reap_errors),
        ]
    }
}
