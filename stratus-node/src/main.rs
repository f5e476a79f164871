//! STRATUS node entry point.

use prometheus::Registry;
use std::sync::Arc;
use stratus_core::SystemClock;
use stratus_node::{
    init_tracing, router, AppState, JobHandles, NodeConfig, NodeMetrics, NodeResult, Services,
};
use stratus_pg::PgStore;

#[tokio::main]
async fn main() -> NodeResult<()> {
    init_tracing()?;

    let config = NodeConfig::from_env()?;
    tracing::info!(
        ms_id = %config.ms_id,
        bind = %config.bind_addr,
        db_host = %config.db.host,
        db_name = %config.db.dbname,
        "Starting STRATUS node"
    );

    let store = Arc::new(PgStore::from_config(&config.db)?);
    if config.migrate {
        store.migrate().await?;
    }

    let services = Services::new(
        store,
        Arc::new(SystemClock::new()),
        config.ms_id,
        &config.coordination,
    );
    let metrics = Arc::new(NodeMetrics::new(Registry::new(), services.metrics.clone())?);
    let app = router(AppState {
        ms_id: config.ms_id,
        store: services.store(),
        metrics,
    });

    let jobs = JobHandles::spawn(&services, &config.coordination);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Serving operational endpoints");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let snapshot = jobs.shutdown().await?;
    tracing::info!(
        cas_applied = snapshot.cas_applied,
        cas_raced = snapshot.cas_raced,
        scan_cycles = snapshot.scan_cycles,
        reap_cycles = snapshot.reap_cycles,
        "STRATUS node stopped"
    );
    Ok(())
}
