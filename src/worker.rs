//! This module contains the poll worker: the receive, invoke and delete loop of one consumer.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::PollError;
use crate::{
    ConsumerDescriptor, DeletionPolicyExecutor, ParameterBinder, QueueTransport, ReceiveRequest,
    ReceivedBatch,
};

/// Lifecycle of a poll worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Polling
    Running,
    /// Stop was requested; the worker exits once its current cycle completes
    Stopping,
    /// The loop has exited
    Stopped,
}

const RUNNING: u8 = 0;
const STOPPED: u8 = 2;

/// Identifies a worker within the pool, e.g. `orders#1`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub queue: String,
    pub index: usize,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.queue, self.index)
    }
}

/// A cheap view of a running worker's state
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    id: WorkerId,
    exited: Arc<AtomicU8>,
    token: CancellationToken,
}

impl WorkerStatus {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        if self.exited.load(Ordering::Acquire) == STOPPED {
            WorkerState::Stopped
        } else if self.token.is_cancelled() {
            WorkerState::Stopping
        } else {
            WorkerState::Running
        }
    }
}

/// What one poll cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The receive call returned no message
    Empty,
    /// A batch was received and handed to the delete policy
    Processed { messages: usize },
}

/// The poll loop of one consumer.
///
/// Each cycle receives a batch with the consumer's prebuilt request, binds it and runs the
/// handler under the consumer's delete policy. Any failure in a cycle is logged and the next
/// cycle starts right away; only the stop token ends the loop. The token is checked at the
/// top of each cycle, so a worker blocked in a receive call finishes it before exiting.
pub struct PollWorker<T> {
    id: WorkerId,
    descriptor: ConsumerDescriptor,
    request: Arc<ReceiveRequest>,
    transport: Arc<T>,
    binder: ParameterBinder,
    deletion: DeletionPolicyExecutor<T>,
    token: CancellationToken,
    exited: Arc<AtomicU8>,
    heartbeat_interval: Duration,
}

impl<T> PollWorker<T>
where
    T: QueueTransport + Send + Sync + 'static,
{
    pub fn new(
        id: WorkerId,
        descriptor: ConsumerDescriptor,
        request: Arc<ReceiveRequest>,
        transport: Arc<T>,
        binder: ParameterBinder,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            descriptor,
            request,
            deletion: DeletionPolicyExecutor::new(Arc::clone(&transport)),
            transport,
            binder,
            token,
            exited: Arc::new(AtomicU8::new(RUNNING)),
            heartbeat_interval: Duration::from_secs(60),
        }
    }

    /// Set the heartbeat interval (builder pattern)
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id.clone(),
            exited: Arc::clone(&self.exited),
            token: self.token.clone(),
        }
    }

    /// Poll until the stop token is cancelled
    #[tracing::instrument(skip(self), fields(worker = %self.id))]
    pub async fn run(self) {
        let queue = self.descriptor.queue_name();
        tracing::info!(queue, handler = self.descriptor.target().name(), "starting consumer");

        let mut last_heartbeat = Instant::now();
        let mut processed: u64 = 0;

        while !self.token.is_cancelled() {
            if last_heartbeat.elapsed() > self.heartbeat_interval {
                tracing::debug!(queue, processed, "consumer heartbeat - still running");
                last_heartbeat = Instant::now();
            }

            match self.poll_once().await {
                Ok(CycleOutcome::Processed { messages }) => processed += messages as u64,
                Ok(CycleOutcome::Empty) => {}
                Err(e) => {
                    tracing::error!(
                        queue,
                        address = %self.request.address,
                        kind = e.as_label(),
                        error = %e,
                        "error while consuming message(s)"
                    );
                }
            }

            // lets other tasks run when the transport answers without suspending
            tokio::task::yield_now().await;
        }

        tracing::info!(queue, processed, "closing consumer");
        self.exited.store(STOPPED, Ordering::Release);
    }

    /// Run exactly one cycle
    pub async fn poll_once(&self) -> Result<CycleOutcome, PollError> {
        let messages = self
            .transport
            .receive(&self.request)
            .await
            .map_err(|e| PollError::Receive(e.to_string()))?;

        if messages.is_empty() {
            return Ok(CycleOutcome::Empty);
        }

        let batch = ReceivedBatch::new(messages);
        tracing::debug!(message_count = batch.len(), "message(s) received from queue");

        self.deletion
            .apply(&self.descriptor, &self.request.address, &batch, || {
                self.invoke(&batch)
            })
            .await?;

        Ok(CycleOutcome::Processed {
            messages: batch.len(),
        })
    }

    async fn invoke(&self, batch: &ReceivedBatch) -> Result<(), PollError> {
        let args = self.binder.bind(&self.descriptor, batch)?;
        let handler = self.descriptor.target().handler();

        match AssertUnwindSafe(handler.call(args)).catch_unwind().await {
            Ok(result) => result.map_err(PollError::Handler),
            Err(panic) => Err(PollError::Handler(
                format!("handler panicked: {}", panic_message(panic.as_ref())).into(),
            )),
        }
    }
}

impl<T> fmt::Debug for PollWorker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollWorker")
            .field("id", &self.id)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
