//! Best-effort request telemetry.
//!
//! Finished requests are appended to an in-memory buffer; a background task swaps the
//! buffer for an empty one and writes it in a single transaction. Entries buffered
//! when the process crashes are lost.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle, time::interval};

use crate::{
    config::StatsConfig,
    metrics::MetricsCollector,
    storage::{PeerRepository, RequestStat, StorageError},
};

pub struct StatsCollector {
    buffer: Mutex<Vec<RequestStat>>,
    repository: Arc<dyn PeerRepository>,
    metrics: Arc<MetricsCollector>,
    max_buffered: usize,
    flush_interval: Duration,
    enabled: bool,
}

impl StatsCollector {
    #[must_use]
    pub fn new(
        repository: Arc<dyn PeerRepository>,
        metrics: Arc<MetricsCollector>,
        config: &StatsConfig,
    ) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            repository,
            metrics,
            max_buffered: config.max_buffered.max(1),
            flush_interval: Duration::from_secs(config.flush_interval_seconds.max(1)),
            enabled: config.enabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Buffers one stat, dropping the oldest entries past `max_buffered`.
    pub fn record(&self, stat: RequestStat) {
        if !self.enabled {
            return;
        }

        let mut buffer = self.buffer.lock();
        buffer.push(stat);
        if buffer.len() > self.max_buffered {
            let excess = buffer.len() - self.max_buffered;
            buffer.drain(..excess);
            tracing::warn!(dropped = excess, "stats buffer full, dropped oldest entries");
        }
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Writes and clears the buffer. A failed write drops the batch.
    ///
    /// # Errors
    ///
    /// Returns the storage error after logging it and counting the failure.
    pub async fn flush(&self) -> Result<u64, StorageError> {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(0);
        }

        match self.repository.insert_request_stats(&batch).await {
            Ok(written) => {
                tracing::debug!(written, "stats flushed");
                self.metrics.record_stats_flush(true);
                Ok(written)
            }
            Err(e) => {
                tracing::warn!(error = %e, dropped = batch.len(), "stats flush failed");
                self.metrics.record_stats_flush(false);
                Err(e)
            }
        }
    }

    /// Spawns the periodic flush loop. A final flush runs after the shutdown signal.
    pub fn start_with_shutdown(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let collector = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(collector.flush_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = collector.flush().await;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = collector.flush().await;
                        tracing::info!("stats collector shutting down");
                        break;
                    }
                }
            }
        })
    }
}
