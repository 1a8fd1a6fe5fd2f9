//! # sqs-dispatch
//!
//! A declarative consumer dispatch engine for at-least-once message queues such as AWS SQS.
//! Applications describe their consumers as data (queue, polling settings, parameter shape
//! and handler) and the dispatcher runs a fixed pool of poll workers for them.
//!
//! ## Features
//!
//! - **Declarative Consumers**: A [`ConsumerDescriptor`] captures the queue, batch size, wait
//!   time, concurrency, delete policy and the handler's parameters
//! - **Startup Validation**: Every consumer is checked against a rule set before any worker
//!   starts, and all violations are reported together
//! - **Parameter Binding**: Message bodies, body lists, attributes or the raw batch are bound
//!   to handler arguments according to each parameter's markers
//! - **Delete Policies**: Delete before processing (at most once) or after a successful
//!   handler call (at least once)
//! - **Cooperative Shutdown**: Workers observe a cancellation token between polls and are
//!   never aborted
//! - **Structured Logging**: `tracing` events with queue, worker and error details
//!
//! ## Quick Start
//!
//! ```rust
//! use sqs_dispatch::{
//!     Arguments, ConsumerDescriptor, DeleteBatchOutcome, DeleteEntry, DeletePolicy, Dispatcher,
//!     HandlerError, Message, ParameterSpec, QueueAddress, QueueTransport, ReceiveRequest,
//!     handler_fn,
//! };
//!
//! // 1. Implement QueueTransport for your queue system
//! struct MyTransport;
//! impl QueueTransport for MyTransport {
//!     type Error = Box<dyn std::error::Error + Send + Sync>;
//!
//!     async fn resolve_queue_address(&self, name: &str) -> Result<QueueAddress, Self::Error> {
//!         Ok(QueueAddress::new(format!("memory://{name}")))
//!     }
//!
//!     async fn receive(&self, _request: &ReceiveRequest) -> Result<Vec<Message>, Self::Error> {
//!         // Your queue receiving logic here
//!         Ok(vec![Message::new("1", "receipt_1", r#"{"id":"42"}"#)])
//!     }
//!
//!     async fn delete_batch(
//!         &self,
//!         _address: &QueueAddress,
//!         entries: Vec<DeleteEntry>,
//!     ) -> Result<DeleteBatchOutcome, Self::Error> {
//!         Ok(DeleteBatchOutcome::all_succeeded(&entries))
//!     }
//! }
//!
//! #[derive(serde::Deserialize)]
//! struct Order {
//!     id: String,
//! }
//!
//! // 2. Describe your consumers
//! let orders = ConsumerDescriptor::builder("orders")
//!     .concurrency(3)
//!     .delete_policy(DeletePolicy::AfterProcessing)
//!     .parameter(ParameterSpec::of::<Order>())
//!     .handler("orders::on_order", handler_fn(|mut args: Arguments| async move {
//!         let order: Order = args.body(0)?;
//!         println!("Processing order {}", order.id);
//!         Ok::<(), HandlerError>(())
//!     }));
//!
//! // 3. Start the dispatcher
//! # async fn example(orders: ConsumerDescriptor) -> Result<(), sqs_dispatch::DispatchError> {
//! let mut dispatcher = Dispatcher::builder(MyTransport)
//!     .descriptors([orders])
//!     .build();
//!
//! dispatcher.start().await?;
//!
//! // Workers poll until stop is called
//! dispatcher.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`QueueTransport`]**: Resolves queue names, receives batches and deletes them
//! - **[`DescriptorProvider`]**: Supplies the consumer set at startup
//! - **[`validation::RuleBasedValidator`]**: Checks every consumer against every rule
//! - **[`ReceiveRequestFactory`]**: Resolves each queue and builds its reusable request
//! - **[`ParameterBinder`]**: Turns a received batch into handler [`Arguments`]
//! - **[`DeletionPolicyExecutor`]**: Orders the handler call and the batch delete
//! - **[`PollWorker`]**: One receive, bind, invoke and delete loop
//! - **[`WorkerPool`]** / **[`Dispatcher`]**: Run `concurrency` workers per consumer
//!
//! ### How it Works
//!
//! [`Dispatcher::start`]:
//! 1. Collects the descriptors from the provider
//! 2. Validates all of them, aborting with every violation at once
//! 3. Resolves every queue address, aborting if any queue is unknown
//! 4. Sizes the pool to the total concurrency and spawns the workers
//!
//! Each worker then continuously:
//! 1. Checks its stop token
//! 2. Receives a batch (long polling up to the consumer's wait time)
//! 3. Binds the batch and calls the handler under the consumer's delete policy
//! 4. Logs any failure and polls again
//!
//! ## Examples
//!
//! See the `demos/` directory for complete working examples, including:
//! - An in-memory queue (`demos/in_memory_consumers.rs`)
//! - AWS SQS integration (`demos/sqs_consumers.rs`, requires the `sqs` feature)

mod binder;
mod deletion;
mod descriptor;
mod dispatcher;
mod error;
mod handler;
mod message;
mod provider;
mod request;
#[cfg(feature = "sqs")]
mod sqs;
mod transport;
pub mod validation;
mod worker;
mod worker_pool;

pub use binder::{BodyDeserializer, JsonBodyDeserializer, ParameterBinder};
pub use deletion::DeletionPolicyExecutor;
pub use descriptor::{
    ConsumerConfig, ConsumerDescriptor, ConsumerDescriptorBuilder, DEFAULT_CONCURRENT_CONSUMERS,
    DEFAULT_MAX_LONG_POLLING_IN_SECONDS, DEFAULT_MAX_MESSAGES_PER_POLL, DeletePolicy, Exposure,
    HandlerTarget, MAX_MESSAGES_PER_POLL_ALLOWED, Marker, ParameterRole, ParameterSpec,
    SHORT_POLLING_VALUE, TargetType,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::{
    ArgumentError, BindingError, DeserializationError, DispatchError, HandlerError, PollError,
    StartupValidationError,
};
pub use handler::{Argument, Arguments, BoundValue, FnHandler, Handler, handler_fn};
pub use message::{DeleteBatchOutcome, DeleteEntry, FailedDelete, Message, QueueAddress, ReceivedBatch};
pub use provider::{ConsumerSource, DescriptorProvider, StaticDescriptorProvider};
pub use request::ReceiveRequestFactory;
#[cfg(feature = "sqs")]
pub use sqs::{SqsTransport, SqsTransportError};
pub use transport::{QueueTransport, ReceiveRequest};
pub use worker::{CycleOutcome, PollWorker, WorkerId, WorkerState, WorkerStatus};
pub use worker_pool::WorkerPool;
