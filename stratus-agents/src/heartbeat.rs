//! Heartbeat scanner.
//!
//! Finds hosts whose heartbeat went stale and times them out through the
//! ownership CAS. Each MS process runs its own scanner; concurrent scanners on
//! other processes simply lose the race for hosts already handled.

use std::sync::Arc;
use std::time::Duration;
use stratus_core::{
    CoordinationConfig, Host, HostEvent, HostStatus, ManagementServerId, StratusResult,
};

use crate::{CasOutcome, CoordinationMetrics, OwnershipCas};

/// Tally of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub stale: usize,
    pub applied: usize,
    pub raced: usize,
    /// Stale hosts with no `PingTimeout` edge, such as `Down`
    pub skipped: usize,
    pub not_found: usize,
    pub errors: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: CasOutcome) {
        match outcome {
            CasOutcome::Applied => self.applied += 1,
            CasOutcome::Raced => self.raced += 1,
            CasOutcome::NoTransition => self.skipped += 1,
            CasOutcome::NotFound => self.not_found += 1,
        }
    }
}

#[derive(Debug)]
pub struct HeartbeatScanner {
    cas: Arc<OwnershipCas>,
    ms_id: ManagementServerId,
    config: CoordinationConfig,
}

impl HeartbeatScanner {
    pub fn new(
        cas: Arc<OwnershipCas>,
        ms_id: ManagementServerId,
        config: CoordinationConfig,
    ) -> Self {
        Self { cas, ms_id, config }
    }

    pub fn metrics(&self) -> &Arc<CoordinationMetrics> {
        self.cas.metrics()
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Hosts in {Up, Updating, Disconnected, Down} whose heartbeat is older
    /// than `timeout`, oldest first, capped at the configured batch size.
    /// Read-only.
    pub async fn find_stale(&self, timeout: Duration) -> StratusResult<Vec<Host>> {
        let cutoff = self.cas.clock().stale_cutoff(timeout);
        self.cas
            .store()
            .find_stale_hosts(&HostStatus::LIVE, cutoff, self.config.scan_batch_size)
            .await
    }

    /// Issue `PingTimeout` for every stale host.
    ///
    /// Fails only when the stale query itself fails; per-host errors are
    /// logged and counted so one bad row does not stall the scan.
    pub async fn scan_once(&self) -> StratusResult<ScanReport> {
        let metrics = self.metrics();
        let stale = self.find_stale(self.config.ping_timeout).await?;
        let mut report = ScanReport {
            stale: stale.len(),
            ..ScanReport::default()
        };
        CoordinationMetrics::add(&metrics.stale_hosts_found, stale.len() as u64);

        for host in &stale {
            match self.cas.apply(host, HostEvent::PingTimeout, self.ms_id).await {
                Ok(outcome) => {
                    if outcome.is_applied() {
                        tracing::info!(
                            host_id = %host.id,
                            from = %host.status,
                            owner = ?host.management_server_id,
                            last_pinged = %host.last_pinged,
                            "Host heartbeat timed out"
                        );
                    }
                    report.record(outcome);
                }
                Err(e) => {
                    report.errors += 1;
                    CoordinationMetrics::incr(&metrics.scan_errors);
                    tracing::error!(host_id = %host.id, error = %e, "Failed to time out host");
                }
            }
        }

        CoordinationMetrics::incr(&metrics.scan_cycles);
        if report.stale > 0 {
            tracing::debug!(
                stale = report.stale,
                applied = report.applied,
                raced = report.raced,
                skipped = report.skipped,
                errors = report.errors,
                "Heartbeat scan finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::{Clock, HeartbeatTick};
    use stratus_storage::HostStore;
    use stratus_test_utils::fixtures;

    fn scanner_over(
        hosts: Vec<Host>,
        clock: Arc<stratus_core::ManualClock>,
    ) -> (HeartbeatScanner, Arc<stratus_storage::MockStorage>) {
        let store = Arc::new(fixtures::store_with(hosts));
        let cas = OwnershipCas::new(store.clone(), clock, Arc::new(CoordinationMetrics::new()));
        let scanner = HeartbeatScanner::new(Arc::new(cas), fixtures::ms(), fixtures::fast_config());
        (scanner, store)
    }

    #[tokio::test]
    async fn test_find_stale_excludes_fresh_removed_and_maintenance() {
        let clock = Arc::new(fixtures::manual_clock());
        let owner = fixtures::ms();
        let old = HeartbeatTick::ZERO;
        let stale_up = fixtures::host_in(HostStatus::Up, owner, old);
        let stale_down = fixtures::host_in(HostStatus::Down, owner, old);
        let removed = fixtures::host_in(HostStatus::Removed, owner, old);
        let maintenance = fixtures::host_in(HostStatus::Maintenance, owner, old);
        let fresh = fixtures::host_in(HostStatus::Up, owner, clock.tick());
        let (scanner, _) = scanner_over(
            vec![stale_up.clone(), stale_down.clone(), removed, maintenance, fresh],
            clock,
        );

        let mut ids: Vec<_> = scanner
            .find_stale(Duration::from_secs(30))
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        ids.sort();
        let mut expected = vec![stale_up.id, stale_down.id];
        expected.sort();

        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_scan_times_out_stale_hosts_and_skips_down() {
        let clock = Arc::new(fixtures::manual_clock());
        let owner = fixtures::ms();
        let stale_up = fixtures::host_in(HostStatus::Up, owner, HeartbeatTick::ZERO);
        let stale_disconnected =
            fixtures::host_in(HostStatus::Disconnected, owner, HeartbeatTick::ZERO);
        let stale_down = fixtures::host_in(HostStatus::Down, owner, HeartbeatTick::ZERO);
        let (scanner, store) = scanner_over(
            vec![stale_up.clone(), stale_disconnected.clone(), stale_down.clone()],
            clock,
        );

        let report = scanner.scan_once().await.unwrap();

        assert_eq!(report.stale, 3);
        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped, 1);
        for id in [stale_up.id, stale_disconnected.id] {
            let host = store.get_host(id).await.unwrap().unwrap();
            assert_eq!(host.status, HostStatus::Alert);
            assert_eq!(host.management_server_id, None);
        }
        let down = store.get_host(stale_down.id).await.unwrap().unwrap();
        assert_eq!(down.status, HostStatus::Down);
    }

    #[tokio::test]
    async fn test_second_scan_finds_nothing_new() {
        let clock = Arc::new(fixtures::manual_clock());
        let stale_up = fixtures::host_in(HostStatus::Up, fixtures::ms(), HeartbeatTick::ZERO);
        let (scanner, _) = scanner_over(vec![stale_up], clock);

        scanner.scan_once().await.unwrap();
        let second = scanner.scan_once().await.unwrap();

        assert_eq!(second, ScanReport::default());
        assert_eq!(scanner.metrics().snapshot().scan_cycles, 2);
    }

    #[tokio::test]
    async fn test_scan_honours_batch_size() {
        let clock = Arc::new(fixtures::manual_clock());
        let owner = fixtures::ms();
        let hosts: Vec<Host> = (0..5)
            .map(|i| fixtures::host_in(HostStatus::Up, owner, HeartbeatTick::from_raw(i)))
            .collect();
        let store = Arc::new(fixtures::store_with(hosts));
        let cas = OwnershipCas::new(store, clock, Arc::new(CoordinationMetrics::new()));
        let config = CoordinationConfig {
            scan_batch_size: 2,
            ..fixtures::fast_config()
        };
        let scanner = HeartbeatScanner::new(Arc::new(cas), fixtures::ms(), config);

        assert_eq!(scanner.scan_once().await.unwrap().applied, 2);
        assert_eq!(scanner.scan_once().await.unwrap().applied, 2);
        assert_eq!(scanner.scan_once().await.unwrap().applied, 1);
    }
}
