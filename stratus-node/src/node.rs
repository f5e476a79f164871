//! Wiring of the coordination services and their background jobs.

use std::sync::Arc;
use stratus_agents::{
    heartbeat_scan_task, transfer_reap_task, CoordinationMetrics, CoordinationSnapshot,
    HeartbeatScanner, OwnershipCas, TransferCoordinator,
};
use stratus_core::{Clock, CoordinationConfig, ManagementServerId};
use stratus_storage::{HostStore, TransferStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::NodeResult;

/// Coordination services of one management server, sharing one store,
/// clock and metrics set.
#[derive(Debug, Clone)]
pub struct Services {
    pub ms_id: ManagementServerId,
    pub cas: Arc<OwnershipCas>,
    pub scanner: Arc<HeartbeatScanner>,
    pub transfers: Arc<TransferCoordinator>,
    pub metrics: Arc<CoordinationMetrics>,
}

impl Services {
    pub fn new<S>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        ms_id: ManagementServerId,
        config: &CoordinationConfig,
    ) -> Self
    where
        S: HostStore + TransferStore + 'static,
    {
        let metrics = Arc::new(CoordinationMetrics::new());
        let cas = Arc::new(OwnershipCas::new(
            store.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let scanner = Arc::new(HeartbeatScanner::new(cas.clone(), ms_id, config.clone()));
        let transfers = Arc::new(TransferCoordinator::new(store, clock, metrics.clone()));
        Self {
            ms_id,
            cas,
            scanner,
            transfers,
            metrics,
        }
    }

    pub fn store(&self) -> Arc<dyn HostStore> {
        Arc::clone(self.cas.store())
    }
}

/// Running heartbeat and reap tasks plus the channel that stops them.
pub struct JobHandles {
    shutdown_tx: watch::Sender<bool>,
    scan: JoinHandle<Arc<CoordinationMetrics>>,
    reap: JoinHandle<Arc<CoordinationMetrics>>,
}

impl JobHandles {
    pub fn spawn(services: &Services, config: &CoordinationConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scan = tokio::spawn(heartbeat_scan_task(
            services.scanner.clone(),
            config.clone(),
            shutdown_rx.clone(),
        ));
        let reap = tokio::spawn(transfer_reap_task(
            services.transfers.clone(),
            config.clone(),
            shutdown_rx,
        ));
        tracing::info!(ms_id = %services.ms_id, "Coordination jobs started");
        Self {
            shutdown_tx,
            scan,
            reap,
        }
    }

    /// Signal both tasks and wait for them. Returns the final counters.
    pub async fn shutdown(self) -> NodeResult<CoordinationSnapshot> {
        // Both receivers may already be gone if a task panicked; join reports it.
        let _ = self.shutdown_tx.send(true);
        let metrics = self.scan.await?;
        self.reap.await?;
        Ok(metrics.snapshot())
    }
}

impl std::fmt::Debug for JobHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandles")
            .field("scan_finished", &self.scan.is_finished())
            .field("reap_finished", &self.reap.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stratus_core::{HeartbeatTick, HostStatus};
    use stratus_test_utils::fixtures;

    #[tokio::test]
    async fn test_jobs_run_and_shut_down() {
        let stale = fixtures::host_in(HostStatus::Up, fixtures::ms(), HeartbeatTick::ZERO);
        let store = Arc::new(fixtures::store_with([stale.clone()]));
        let config = CoordinationConfig {
            scan_interval: Duration::from_millis(10),
            reap_interval: Duration::from_millis(10),
            ..fixtures::fast_config()
        };
        let services = Services::new(
            store.clone(),
            Arc::new(fixtures::manual_clock()),
            fixtures::ms(),
            &config,
        );

        let jobs = JobHandles::spawn(&services, &config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = jobs.shutdown().await.unwrap();

        assert!(snapshot.scan_cycles >= 1);
        assert!(snapshot.reap_cycles >= 1);
        let host = store.get_host(stale.id).await.unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Alert);
    }

    #[test]
    fn test_services_share_metrics() {
        let services = Services::new(
            Arc::new(stratus_storage::MockStorage::new()),
            Arc::new(fixtures::manual_clock()),
            fixtures::ms(),
            &fixtures::fast_config(),
        );

        assert!(Arc::ptr_eq(&services.metrics, services.cas.metrics()));
        assert!(Arc::ptr_eq(&services.metrics, services.transfers.metrics()));
        assert!(Arc::ptr_eq(&services.metrics, services.scanner.metrics()));
    }
}
