//! This module builds the receive request each poll worker reuses for its consumer.

use std::sync::Arc;

use crate::error::DispatchError;
use crate::{ConsumerDescriptor, QueueTransport, ReceiveRequest};

/// Resolves a consumer's queue and builds its [`ReceiveRequest`].
///
/// Resolution failure is fatal: a consumer cannot run without its queue, so the error is
/// returned as [`DispatchError::QueueResolution`] and aborts startup.
#[derive(Debug)]
pub struct ReceiveRequestFactory<T> {
    transport: Arc<T>,
}

impl<T> ReceiveRequestFactory<T>
where
    T: QueueTransport,
{
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub async fn create_for(&self, descriptor: &ConsumerDescriptor) -> Result<ReceiveRequest, DispatchError> {
        let queue = descriptor.queue_name();
        let address = self
            .transport
            .resolve_queue_address(queue)
            .await
            .map_err(|e| {
                tracing::error!(queue, error = %e, "unable to get queue address");
                DispatchError::QueueResolution {
                    queue: queue.to_owned(),
                    reason: e.to_string(),
                }
            })?;

        let config = descriptor.config();
        let request = ReceiveRequest {
            address,
            max_messages: config.max_messages_per_poll,
            wait_time_seconds: config.wait_time_seconds,
            attribute_names: descriptor.attribute_names(),
        };

        tracing::debug!(queue, address = %request.address, "built receive request");

        Ok(request)
    }
}
