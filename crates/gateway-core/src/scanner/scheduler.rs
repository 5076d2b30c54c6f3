use std::{sync::Arc, time::Duration};

use dashmap::DashSet;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    config::ScannerConfig,
    storage::{Peer, PeerRepository, StorageError},
};

use super::ChainAdapter;

/// A unit of scanner work.
#[derive(Debug, Clone)]
pub enum ScanTask {
    Scan(Peer),
    Discover,
}

impl ScanTask {
    /// Dedup key; a peer is queued at most once.
    fn key(&self) -> String {
        match self {
            Self::Scan(peer) => format!("scan:{}", peer.id),
            Self::Discover => "discover".to_string(),
        }
    }
}

/// Sending half of the task queue with dedup of queued and in-flight tasks.
#[derive(Clone)]
struct TaskQueue {
    tx: mpsc::Sender<ScanTask>,
    pending: Arc<DashSet<String>>,
}

impl TaskQueue {
    /// Enqueues unless the task is already pending. Returns whether it was queued.
    fn offer(&self, task: ScanTask) -> bool {
        let key = task.key();
        if !self.pending.insert(key.clone()) {
            return false;
        }

        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(e) => {
                self.pending.remove(&key);
                tracing::warn!(task = %key, error = %e, "scan queue rejected task");
                false
            }
        }
    }
}

/// Worker pool plus the timer that feeds it.
pub struct Scanner {
    adapter: Arc<dyn ChainAdapter>,
    repository: Arc<dyn PeerRepository>,
    workers: usize,
    queue_capacity: usize,
    scan_interval: Duration,
    discovery_interval: Duration,
}

impl Scanner {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        repository: Arc<dyn PeerRepository>,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            adapter,
            repository,
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            scan_interval: config.scan_interval(),
            discovery_interval: config.discovery_interval(),
        }
    }

    /// Runs one task. Failures are logged and never stop the worker.
    pub async fn run_task(adapter: &dyn ChainAdapter, task: &ScanTask) {
        match task {
            ScanTask::Scan(peer) => {
                if let Err(e) = adapter.scan_peer(peer).await {
                    tracing::error!(peer = %peer.address, error = %e, "peer scan failed");
                }
            }
            ScanTask::Discover => {
                if let Err(e) = adapter.discover().await {
                    tracing::warn!(error = %e, "discovery pass failed");
                }
            }
        }
    }

    /// Prepares the adapter, then spawns the workers and the scheduler.
    pub async fn start(self, shutdown_rx: broadcast::Receiver<()>) -> ScannerHandle {
        self.adapter.prepare().await;

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let queue = TaskQueue { tx, pending: Arc::new(DashSet::new()) };

        let mut handles = Vec::with_capacity(self.workers + 1);
        for worker in 0..self.workers {
            handles.push(Self::spawn_worker(
                worker,
                Arc::clone(&self.adapter),
                Arc::clone(&rx),
                Arc::clone(&queue.pending),
                shutdown_rx.resubscribe(),
            ));
        }

        tracing::info!(
            blockchain = self.adapter.blockchain(),
            workers = self.workers,
            scan_interval_secs = self.scan_interval.as_secs(),
            discovery_interval_secs = self.discovery_interval.as_secs(),
            "scanner started"
        );
        handles.push(self.spawn_scheduler(queue, shutdown_rx));

        ScannerHandle { handles }
    }

    fn spawn_worker(
        worker: usize,
        adapter: Arc<dyn ChainAdapter>,
        rx: Arc<Mutex<mpsc::Receiver<ScanTask>>>,
        pending: Arc<DashSet<String>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = shutdown_rx.recv() => None,
                    task = async { rx.lock().await.recv().await } => task,
                };
                let Some(task) = next else {
                    break;
                };

                Self::run_task(adapter.as_ref(), &task).await;
                pending.remove(&task.key());
            }
            tracing::debug!(worker, "scanner worker stopped");
        })
    }

    /// Enqueues discovery and full scan cycles on their timers. Dropping the queue
    /// on exit closes it for the workers.
    fn spawn_scheduler(
        self,
        queue: TaskQueue,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut discovery_ticker = interval(self.discovery_interval);
            discovery_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut scan_ticker = interval(self.scan_interval);
            scan_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("scanner scheduler shutting down");
                        break;
                    }
                    _ = discovery_ticker.tick() => {
                        queue.offer(ScanTask::Discover);
                    }
                    _ = scan_ticker.tick() => {
                        match self.enqueue_scan_cycle(&queue).await {
                            Ok(queued) => tracing::info!(queued, "scan cycle scheduled"),
                            Err(e) => tracing::error!(error = %e, "failed to list peers for scan cycle"),
                        }
                    }
                }
            }
        })
    }

    async fn enqueue_scan_cycle(&self, queue: &TaskQueue) -> Result<usize, StorageError> {
        let peers = self.repository.list_peers(self.adapter.blockchain()).await?;
        Ok(peers
            .into_iter()
            .filter(|peer| !peer.is_outdated)
            .filter(|peer| queue.offer(ScanTask::Scan(peer.clone())))
            .count())
    }
}

/// Join handle for every scanner task.
pub struct ScannerHandle {
    handles: Vec<JoinHandle<()>>,
}

impl ScannerHandle {
    /// Waits for the scheduler and all workers to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "scanner task panicked");
            }
        }
    }
}
