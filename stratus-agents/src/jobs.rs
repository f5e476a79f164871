//! Periodic background tasks.
//!
//! Each MS process runs one heartbeat scan task and one transfer reap task.
//! Both poll on a tokio interval, skip missed ticks, and stop when the watch
//! channel carries `true`. Timeouts are plain values compared on each pass;
//! no timer takes part in correctness.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(heartbeat_scan_task(scanner, config, shutdown_rx));
//!
//! // Later, trigger shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

use std::sync::Arc;
use stratus_core::CoordinationConfig;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::{CoordinationMetrics, HeartbeatScanner, TransferCoordinator};

/// Run heartbeat scans until shutdown. Returns the shared metrics.
pub async fn heartbeat_scan_task(
    scanner: Arc<HeartbeatScanner>,
    config: CoordinationConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CoordinationMetrics> {
    let metrics = Arc::clone(scanner.metrics());

    let mut scan_interval = interval(config.scan_interval);
    scan_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        scan_interval_secs = config.scan_interval.as_secs(),
        ping_timeout_secs = config.ping_timeout.as_secs(),
        batch_size = config.scan_batch_size,
        "Heartbeat scan task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Heartbeat scan task shutting down");
                    break;
                }
            }

            _ = scan_interval.tick() => {
                if let Err(e) = scanner.scan_once().await {
                    CoordinationMetrics::incr(&metrics.scan_errors);
                    tracing::error!(error = %e, "Heartbeat scan failed");
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        scan_cycles = snapshot.scan_cycles,
        stale_hosts_found = snapshot.stale_hosts_found,
        scan_errors = snapshot.scan_errors,
        "Heartbeat scan task completed"
    );

    metrics
}

/// Reap abandoned transfer records until shutdown. Returns the shared metrics.
pub async fn transfer_reap_task(
    coordinator: Arc<TransferCoordinator>,
    config: CoordinationConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CoordinationMetrics> {
    let metrics = Arc::clone(coordinator.metrics());

    let mut reap_interval = interval(config.reap_interval);
    reap_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        reap_interval_secs = config.reap_interval.as_secs(),
        transfer_timeout_secs = config.transfer_timeout.as_secs(),
        "Transfer reap task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Transfer reap task shutting down");
                    break;
                }
            }

            _ = reap_interval.tick() => {
                match coordinator.reap_stale(config.transfer_timeout).await {
                    Ok(_) => CoordinationMetrics::incr(&metrics.reap_cycles),
                    Err(e) => {
                        CoordinationMetrics::incr(&metrics.reap_errors);
                        tracing::error!(error = %e, "Transfer reap failed");
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        reap_cycles = snapshot.reap_cycles,
        transfers_abandoned = snapshot.transfers_abandoned,
        reap_errors = snapshot.reap_errors,
        "Transfer reap task completed"
    );

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stratus_core::{Clock, EntityIdType, HeartbeatTick, HostId, HostStatus};
    use stratus_storage::{HostStore, MockStorage};
    use stratus_test_utils::fixtures;

    use crate::OwnershipCas;

    fn fast_config() -> CoordinationConfig {
        CoordinationConfig {
            scan_interval: Duration::from_millis(10),
            reap_interval: Duration::from_millis(10),
            ..fixtures::fast_config()
        }
    }

    #[tokio::test]
    async fn test_scan_task_times_out_and_stops() {
        let clock = Arc::new(fixtures::manual_clock());
        let stale = fixtures::host_in(HostStatus::Up, fixtures::ms(), HeartbeatTick::ZERO);
        let store = Arc::new(fixtures::store_with([stale.clone()]));
        let cas = OwnershipCas::new(store.clone(), clock, Arc::new(CoordinationMetrics::new()));
        let scanner = Arc::new(HeartbeatScanner::new(
            Arc::new(cas),
            fixtures::ms(),
            fast_config(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(heartbeat_scan_task(scanner, fast_config(), shutdown_rx));
        // The first interval tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();

        assert!(metrics.snapshot().scan_cycles >= 1);
        let host = store.get_host(stale.id).await.unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Alert);
    }

    #[tokio::test]
    async fn test_reap_task_removes_stale_transfer() {
        let clock = Arc::new(fixtures::manual_clock());
        let store = Arc::new(MockStorage::new());
        let coordinator = Arc::new(TransferCoordinator::new(
            store.clone(),
            clock.clone(),
            Arc::new(CoordinationMetrics::new()),
        ));
        let host_id = HostId::now_v7();
        coordinator
            .open(host_id, fixtures::ms(), fixtures::ms())
            .await
            .unwrap();
        clock.advance(fast_config().transfer_timeout + Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(transfer_reap_task(
            coordinator.clone(),
            fast_config(),
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();

        assert_eq!(metrics.snapshot().transfers_abandoned, 1);
        assert!(coordinator.find_active(host_id).await.unwrap().is_none());
        assert!(clock.now() > fixtures::epoch());
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_task() {
        let store = Arc::new(MockStorage::new());
        let coordinator = Arc::new(TransferCoordinator::new(
            store,
            Arc::new(fixtures::manual_clock()),
            Arc::new(CoordinationMetrics::new()),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(transfer_reap_task(coordinator, fast_config(), shutdown_rx));
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
