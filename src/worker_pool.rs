//! This module contains the worker pool that runs every poll worker of the dispatcher

use std::{sync::Arc, time::Duration};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;
use crate::{ConsumerDescriptor, PollWorker, QueueTransport, WorkerId, WorkerState, WorkerStatus};

/// Spawn a worker task that holds one pool permit for as long as the worker runs
fn spawn_worker_task<T>(
    semaphore: Arc<Semaphore>,
    worker: PollWorker<T>,
) -> JoinHandle<()>
where
    T: QueueTransport + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let _permit = match semaphore.acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                tracing::error!(worker = %worker.id(), "worker pool closed before the worker started");
                return;
            }
        };

        worker.run().await;

        // Permit is automatically dropped here
    })
}

/// A fixed-size pool of long-running poll workers
///
/// The pool holds one permit per worker slot. Its capacity is the sum of every consumer's
/// concurrency, so each submitted worker gets a slot of its own and runs for the whole
/// dispatcher lifetime. Workers submitted past capacity wait for a slot to free up.
///
/// All workers share the pool's stop token. [`WorkerPool::shutdown`] cancels it and waits
/// for the workers to observe it; workers are never aborted.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    token: CancellationToken,
    workers: Vec<WorkerStatus>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool with the given number of worker slots
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            token: CancellationToken::new(),
            workers: Vec::with_capacity(capacity),
            handles: Vec::with_capacity(capacity),
        }
    }

    /// Create a pool with one slot per worker the descriptors ask for
    pub fn for_descriptors(descriptors: &[ConsumerDescriptor]) -> Self {
        let capacity = descriptors
            .iter()
            .map(|d| usize::try_from(d.config().concurrency).unwrap_or(0))
            .sum();
        Self::new(capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of submitted workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// The stop token workers of this pool must be built with
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a worker onto the pool
    pub fn submit<T>(&mut self, worker: PollWorker<T>)
    where
        T: QueueTransport + Send + Sync + 'static,
    {
        let status = worker.status();
        tracing::debug!(
            worker = %status.id(),
            available_permits = self.semaphore.available_permits(),
            "submitting worker"
        );
        self.handles
            .push(spawn_worker_task(Arc::clone(&self.semaphore), worker));
        self.workers.push(status);
    }

    /// Whether any spawned worker task has not finished yet
    pub fn has_live_workers(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    /// Current state of every submitted worker, in submission order
    pub fn states(&self) -> Vec<(WorkerId, WorkerState)> {
        self.workers
            .iter()
            .map(|status| (status.id().clone(), status.state()))
            .collect()
    }

    /// Signal every worker to stop and wait up to `grace` for them to exit
    ///
    /// Workers still running once `grace` elapsed are reported in
    /// [`DispatchError::ShutdownTimeout`] and left to finish on their own. Calling it again
    /// waits for those workers only.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), DispatchError> {
        tracing::info!(worker_count = self.handles.len(), ?grace, "stopping worker pool");
        self.token.cancel();

        let joined =
            tokio::time::timeout(grace, futures::future::join_all(self.handles.iter_mut())).await;

        match joined {
            Ok(results) => {
                for e in results.into_iter().filter_map(Result::err) {
                    tracing::error!(error = %e, "worker task failed");
                }
                self.handles.clear();
                tracing::info!("worker pool stopped");
                Ok(())
            }
            Err(_) => {
                // finished handles were already polled to completion
                self.handles.retain(|handle| !handle.is_finished());
                let pending: Vec<String> = self
                    .workers
                    .iter()
                    .filter(|status| status.state() != WorkerState::Stopped)
                    .map(|status| status.id().to_string())
                    .collect();
                tracing::warn!(?pending, "worker pool did not stop within the grace period");
                Err(DispatchError::ShutdownTimeout { grace, pending })
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .field("workers", &self.workers.len())
            .field("running", &self.handles.len())
            .field("stopping", &self.token.is_cancelled())
            .finish()
    }
}
