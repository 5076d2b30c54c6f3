//! Runtime lifecycle: background tasks and graceful shutdown.

use crate::{config::AppConfig, proxy::EndpointRefresher};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::GatewayRuntimeBuilder, GatewayComponents};

/// Owns the gateway components and their background tasks.
///
/// `shutdown()` broadcasts on the shared channel and awaits every task, so the stats
/// collector gets its final flush before the process exits.
pub struct GatewayRuntime {
    components: GatewayComponents,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl GatewayRuntime {
    #[must_use]
    pub fn builder() -> GatewayRuntimeBuilder {
        GatewayRuntimeBuilder::new()
    }

    /// Starts the background tasks. Called by [`GatewayRuntimeBuilder`].
    pub(super) fn new(
        components: GatewayComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: &AppConfig,
        enable_refresher: bool,
    ) -> Self {
        let mut tasks = Vec::new();

        if enable_refresher {
            let refresher = EndpointRefresher::new(
                components.repository().clone(),
                components.transport().clone(),
                config.scanner.blockchain.clone(),
                config.refresh_interval(),
            );
            tasks.push(("endpoint_refresher", refresher.start_with_shutdown(shutdown_tx.subscribe())));
            debug!("Endpoint refresher task started");
        }

        if let Some(stats) = components.stats_collector() {
            tasks.push(("stats_collector", stats.start_with_shutdown(shutdown_tx.subscribe())));
            debug!("Stats collector task started");
        }

        Self {
            components,
            shutdown_tx,
            tasks,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn components(&self) -> &GatewayComponents {
        &self.components
    }

    #[must_use]
    pub fn proxy_engine(&self) -> &Arc<crate::proxy::ProxyEngine> {
        self.components.proxy_engine()
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<crate::upstream::Transport> {
        self.components.transport()
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<crate::metrics::MetricsCollector> {
        self.components.metrics_collector()
    }

    /// Creates a receiver that fires when shutdown starts.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signals every background task and waits for all of them to finish.
    ///
    /// Idempotent: a second call returns immediately.
    pub async fn shutdown(&mut self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating gateway runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "Failed to send shutdown signal (no receivers)");
        }

        for (name, task) in self.tasks.drain(..) {
            match task.await {
                Ok(()) => debug!(task = name, "Background task completed"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Background task cancelled"),
                Err(e) => error!(task = name, error = %e, "Background task failed"),
            }
        }

        info!("Gateway runtime shutdown complete");
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<GatewayRuntime>;
    let _ = assert_sync::<GatewayRuntime>;
};
