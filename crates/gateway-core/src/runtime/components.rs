//! Shared component handles owned by the runtime.

use crate::{
    metrics::MetricsCollector, proxy::ProxyEngine, stats::StatsCollector, storage::PeerRepository,
    upstream::Transport,
};
use std::sync::Arc;

/// Every long-lived component of the proxy, wired together.
///
/// Components are reference-counted so the HTTP front-end and background tasks can
/// hold them independently of the runtime.
#[derive(Clone)]
pub struct GatewayComponents {
    metrics_collector: Arc<MetricsCollector>,
    repository: Arc<dyn PeerRepository>,
    transport: Arc<Transport>,
    stats_collector: Option<Arc<StatsCollector>>,
    proxy_engine: Arc<ProxyEngine>,
}

impl GatewayComponents {
    #[must_use]
    pub fn new(
        metrics_collector: Arc<MetricsCollector>,
        repository: Arc<dyn PeerRepository>,
        transport: Arc<Transport>,
        stats_collector: Option<Arc<StatsCollector>>,
        proxy_engine: Arc<ProxyEngine>,
    ) -> Self {
        Self { metrics_collector, repository, transport, stats_collector, proxy_engine }
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn PeerRepository> {
        &self.repository
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    #[must_use]
    pub fn stats_collector(&self) -> Option<&Arc<StatsCollector>> {
        self.stats_collector.as_ref()
    }

    #[must_use]
    pub fn has_stats_collector(&self) -> bool {
        self.stats_collector.is_some()
    }

    #[must_use]
    pub fn proxy_engine(&self) -> &Arc<ProxyEngine> {
        &self.proxy_engine
    }
}
