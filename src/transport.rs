//! This module provides the trait used to resolve, receive from and delete from a queue.

use crate::{DeleteBatchOutcome, DeleteEntry, Message, QueueAddress};

/// A reusable receive configuration, built once per consumer at startup.
///
/// See [`ReceiveRequestFactory`](crate::ReceiveRequestFactory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Resolved address of the queue
    pub address: QueueAddress,
    /// Maximum number of messages fetched in one call (1 to 10)
    pub max_messages: i32,
    /// How long a receive call may wait for messages, in seconds (0 to 20)
    pub wait_time_seconds: i32,
    /// Attribute names the consumer binds, so the transport fetches them
    pub attribute_names: Vec<String>,
}

/// A trait for queue transports that can be used by the dispatcher.
///
/// Implement this trait to integrate your queue system with the dispatcher. A single
/// transport instance is shared by every poll worker, so implementations must be safe
/// for concurrent use.
///
/// # Examples
///
/// ```rust
/// use sqs_dispatch::{
///     DeleteBatchOutcome, DeleteEntry, Message, QueueAddress, QueueTransport, ReceiveRequest,
/// };
///
/// struct StaticQueue;
///
/// impl QueueTransport for StaticQueue {
///     type Error = Box<dyn std::error::Error + Send + Sync>;
///
///     async fn resolve_queue_address(&self, name: &str) -> Result<QueueAddress, Self::Error> {
///         Ok(QueueAddress::new(format!("memory://{name}")))
///     }
///
///     async fn receive(&self, _request: &ReceiveRequest) -> Result<Vec<Message>, Self::Error> {
///         Ok(vec![Message::new("1", "receipt-1", r#"{"id":"42"}"#)])
///     }
///
///     async fn delete_batch(
///         &self,
///         _address: &QueueAddress,
///         entries: Vec<DeleteEntry>,
///     ) -> Result<DeleteBatchOutcome, Self::Error> {
///         Ok(DeleteBatchOutcome::all_succeeded(&entries))
///     }
/// }
/// ```
pub trait QueueTransport {
    /// The error that can be returned by the transport
    type Error: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static;

    /// Resolve a logical queue name to the address used by the other calls.
    ///
    /// Failing to resolve any queue aborts [`Dispatcher::start`](crate::Dispatcher::start).
    fn resolve_queue_address(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<QueueAddress, Self::Error>> + Send;

    /// Receive up to `request.max_messages` messages, waiting up to
    /// `request.wait_time_seconds` when the queue is empty.
    ///
    /// Returning an empty Vec is normal and makes the worker poll again.
    fn receive(
        &self,
        request: &ReceiveRequest,
    ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send;

    /// Delete every entry in one request.
    ///
    /// Per-entry failures are reported in the outcome; `Err` means the call as a whole failed.
    fn delete_batch(
        &self,
        address: &QueueAddress,
        entries: Vec<DeleteEntry>,
    ) -> impl Future<Output = Result<DeleteBatchOutcome, Self::Error>> + Send;
}
