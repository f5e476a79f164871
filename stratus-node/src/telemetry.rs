//! Tracing initialisation and the Prometheus registry.

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use stratus_agents::CoordinationMetrics;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{NodeError, NodeResult};

const NAMESPACE: &str = "stratus";

/// Install the JSON tracing subscriber. Call once, before anything logs.
pub fn init_tracing() -> NodeResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("stratus_node=info,stratus_agents=info,stratus_pg=info,warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| NodeError::Telemetry(e.to_string()))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Telemetry initialized");
    Ok(())
}

/// Prometheus view of the coordination counters.
///
/// The registry is injected; nothing is registered globally. Counters are
/// brought up to date from a `CoordinationMetrics` snapshot on each scrape.
pub struct NodeMetrics {
    registry: Registry,
    coordination: Arc<CoordinationMetrics>,
    counters: Vec<IntCounter>,
    store_healthy: IntGauge,
}

impl NodeMetrics {
    pub fn new(registry: Registry, coordination: Arc<CoordinationMetrics>) -> NodeResult<Self> {
        let mut counters = Vec::new();
        for (name, help, _) in coordination.snapshot().counters() {
            let opts = Opts::new(format!("{name}_total"), help).namespace(NAMESPACE);
            let counter = IntCounter::with_opts(opts)?;
            registry.register(Box::new(counter.clone()))?;
            counters.push(counter);
        }

        let store_healthy = IntGauge::with_opts(
            Opts::new("store_healthy", "1 when the last store health check succeeded")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(store_healthy.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            coordination,
            counters,
            store_healthy,
        })
    }

    pub fn coordination(&self) -> &Arc<CoordinationMetrics> {
        &self.coordination
    }

    pub fn set_store_healthy(&self, healthy: bool) {
        self.store_healthy.set(i64::from(healthy));
    }

    /// Advance each counter to the current snapshot value.
    pub fn refresh(&self) {
        let snapshot = self.coordination.snapshot();
        for (counter, (_, _, value)) in self.counters.iter().zip(snapshot.counters()) {
            let delta = value.saturating_sub(counter.get());
            if delta > 0 {
                counter.inc_by(delta);
            }
        }
    }

    /// Refresh and render the registry in the text exposition format.
    pub fn encode(&self) -> NodeResult<Vec<u8>> {
        self.refresh();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics")
            .field("counters", &self.counters.len())
            .finish_non_exhaustive()
    }
}
