use std::{sync::Arc, time::Duration};

use ahash::AHashSet;
use tokio::{sync::broadcast, task::JoinHandle, time::interval};

use crate::{
    storage::{PeerRepository, StorageError},
    upstream::{Endpoint, RefreshSummary, Transport},
};

/// Periodically rebuilds the transport's primary targets from peer storage.
pub struct EndpointRefresher {
    repository: Arc<dyn PeerRepository>,
    transport: Arc<Transport>,
    blockchain: String,
    interval: Duration,
}

impl EndpointRefresher {
    #[must_use]
    pub fn new(
        repository: Arc<dyn PeerRepository>,
        transport: Arc<Transport>,
        blockchain: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self { repository, transport, blockchain: blockchain.into(), interval }
    }

    /// Reads the method catalog and routable peers, then reconciles the transport.
    ///
    /// An empty catalog keeps the transport's current scanned-method set.
    ///
    /// # Errors
    ///
    /// Returns a storage error; the transport is left untouched in that case.
    pub async fn refresh_once(&self) -> Result<RefreshSummary, StorageError> {
        let catalog = self.repository.list_methods(&self.blockchain).await?;
        let capabilities = self.repository.peer_capabilities(&self.blockchain).await?;

        if !catalog.is_empty() {
            self.transport.set_scanned_methods(catalog.into_iter().collect());
        }

        let endpoints: Vec<Endpoint> = capabilities
            .into_iter()
            .filter(|c| c.peer.is_routable() && !c.methods.is_empty())
            .map(|c| Endpoint {
                url: c.peer.rpc_url(),
                methods: c.methods.into_iter().map(|m| m.method).collect::<AHashSet<_>>(),
            })
            .collect();

        let summary = self.transport.update_targets(&endpoints);
        if summary.is_noop() {
            tracing::debug!(targets = endpoints.len(), "endpoints unchanged");
        } else {
            tracing::info!(
                added = summary.added,
                removed = summary.removed,
                updated = summary.updated,
                targets = endpoints.len(),
                "endpoints refreshed"
            );
        }
        Ok(summary)
    }

    /// Spawns the refresh loop. The first refresh runs immediately.
    pub fn start_with_shutdown(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh_once().await {
                            tracing::error!(error = %e, "endpoint refresh failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("endpoint refresher shutting down");
                        break;
                    }
                }
            }
        })
    }
}
