//! This module applies a consumer's delete policy around the handler invocation.

use std::sync::Arc;

use crate::error::PollError;
use crate::{ConsumerDescriptor, DeleteBatchOutcome, DeletePolicy, QueueAddress, QueueTransport, ReceivedBatch};

/// Orders deletion and invocation according to [`DeletePolicy`].
///
/// - `BeforeProcessing`: the batch is deleted first, then the handler runs. A handler
///   failure is still returned, but the messages are gone.
/// - `AfterProcessing`: the handler runs first. On failure the error is returned and the
///   batch is left on the queue for redelivery; on success the batch is deleted.
///
/// Deletion always covers the whole batch in one call. Entries the transport reports as
/// failed are logged and never retried.
#[derive(Debug)]
pub struct DeletionPolicyExecutor<T> {
    transport: Arc<T>,
}

impl<T> Clone for DeletionPolicyExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T> DeletionPolicyExecutor<T>
where
    T: QueueTransport,
{
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub async fn apply<F, Fut>(
        &self,
        descriptor: &ConsumerDescriptor,
        address: &QueueAddress,
        batch: &ReceivedBatch,
        invoke: F,
    ) -> Result<(), PollError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), PollError>>,
    {
        match descriptor.config().delete_policy {
            DeletePolicy::BeforeProcessing => {
                self.delete_batch(address, batch).await?;
                invoke().await
            }
            DeletePolicy::AfterProcessing => {
                if let Err(e) = invoke().await {
                    tracing::warn!(
                        queue = descriptor.queue_name(),
                        %address,
                        "failed to consume message(s), message(s) will not be deleted"
                    );
                    return Err(e);
                }
                self.delete_batch(address, batch).await.map(|_| ())
            }
        }
    }

    /// Delete every message of the batch in one request
    pub async fn delete_batch(
        &self,
        address: &QueueAddress,
        batch: &ReceivedBatch,
    ) -> Result<DeleteBatchOutcome, PollError> {
        let outcome = self
            .transport
            .delete_batch(address, batch.delete_entries())
            .await
            .map_err(|e| PollError::Delete(e.to_string()))?;

        if outcome.is_partial_failure() {
            tracing::error!(
                %address,
                failed = ?outcome.failed,
                succeeded = outcome.succeeded.len(),
                "error deleting messages"
            );
        }
        tracing::trace!(%address, succeeded = ?outcome.succeeded, "messages deleted");

        Ok(outcome)
    }
}
