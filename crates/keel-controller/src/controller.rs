use crate::client::Client;
use crate::error::{ControllerError, Result};
use crate::mapper::map_event;
use crate::queue::{BackoffConfig, WorkQueue};
use crate::reconciler::Reconciler;
use futures_util::StreamExt;
use keel_core::{Cluster, ObjectKey, Resource};
use keel_storage::{LabelSelector, ObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for the cluster controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers
    pub workers: usize,
    /// Deadline for a single reconcile
    pub reconcile_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            reconcile_timeout: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Watches the store and feeds Cluster keys to a pool of reconcile workers
pub struct ClusterController {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<WorkQueue<ObjectKey>>,
    config: ControllerConfig,
}

impl ClusterController {
    pub fn new(reconciler: Reconciler, store: Arc<dyn ObjectStore>, config: ControllerConfig) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            store,
            queue: Arc::new(WorkQueue::new(config.backoff.clone())),
            config,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// Run until `token` is cancelled, then drain the workers
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            "Starting cluster controller ({} workers, reconcile timeout {:?})",
            self.config.workers, self.config.reconcile_timeout
        );

        // Subscribe before listing so nothing written in between is missed
        let mut events = BroadcastStream::new(self.store.watch());
        self.resync().await?;

        let workers: Vec<_> = (0..self.config.workers.max(1))
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&self.reconciler),
                    Arc::clone(&self.queue),
                    self.config.reconcile_timeout,
                ))
            })
            .collect();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Cluster controller shutting down");
                    break;
                }
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        for key in map_event(&event) {
                            self.queue.add(key);
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                        warn!("Watch fell behind by {} events, resyncing", missed);
                        if let Err(e) = self.resync().await {
                            error!("Resync failed: {}", e);
                        }
                    }
                    None => {
                        warn!("Watch channel closed, stopping controller");
                        break;
                    }
                }
            }
        }

        self.queue.shutdown();
        for result in futures_util::future::join_all(workers).await {
            if let Err(e) = result {
                error!("Reconcile worker panicked: {}", e);
            }
        }
        info!("Cluster controller stopped");
        Ok(())
    }

    /// Queue every Cluster in the store
    async fn resync(&self) -> Result<()> {
        let clusters = Client::new(Arc::clone(&self.store))
            .list::<Cluster>(None, &LabelSelector::everything())
            .await?;
        debug!("Resync queued {} clusters", clusters.len());
        for cluster in clusters {
            self.queue.add(cluster.object_key());
        }
        Ok(())
    }
}

async fn worker(
    id: usize,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue<ObjectKey>>,
    timeout: Duration,
) {
    debug!("Reconcile worker {} started", id);
    while let Some(key) = queue.get().await {
        debug!("Worker {} reconciling cluster {}", id, key);

        let outcome = match tokio::time::timeout(timeout, reconciler.reconcile(&key)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ControllerError::timeout(key.to_string(), timeout.as_secs())),
        };

        match outcome {
            Ok(action) => {
                queue.forget(&key);
                if let Some(after) = action.requeue_after {
                    queue.add_after(key.clone(), after);
                }
            }
            Err(e) if e.is_conflict() => {
                debug!("Cluster {} changed during reconcile, retrying: {}", key, e);
                queue.add_rate_limited(key.clone());
            }
            Err(e) => {
                error!(
                    "Failed to reconcile cluster {} (attempt {}): {}",
                    key,
                    queue.num_requeues(&key) + 1,
                    e
                );
                queue.add_rate_limited(key.clone());
            }
        }
        queue.done(&key);
    }
    debug!("Reconcile worker {} stopped", id);
}
