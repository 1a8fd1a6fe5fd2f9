//! Error types used by the dispatcher and its poll workers.
//!
//! - [`DispatchError`]: fatal errors returned by [`Dispatcher::start`](crate::Dispatcher::start)
//!   and [`Dispatcher::stop`](crate::Dispatcher::stop).
//! - [`PollError`]: a failed poll cycle. Always logged, never fatal to the worker.
//! - [`BindingError`]: a received batch cannot satisfy a consumer's parameters.
//! - [`ArgumentError`]: a handler asked for an argument in a shape it was not bound in.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by handlers, same shape as any `std::error::Error`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// One or more consumers violate a validation rule.
///
/// Holds every violated rule's message across every consumer. Startup is aborted and no
/// worker is started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Some consumers are not well defined: errorMessages={}", .messages.join("\n"))]
pub struct StartupValidationError {
    pub messages: Vec<String>,
}

/// # Fatal errors produced by the dispatcher.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] StartupValidationError),

    /// A consumer's queue could not be resolved. Aborts the dispatcher as a whole.
    #[error("unable to resolve queue address: queue={queue}, reason={reason}")]
    QueueResolution { queue: String, reason: String },

    #[error("dispatcher is already running")]
    AlreadyStarted,

    /// Workers still running once the grace period elapsed. They are not cancelled.
    #[error("shutdown timeout {grace:?} exceeded; still running: {pending:?}")]
    ShutdownTimeout { grace: Duration, pending: Vec<String> },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "startup_validation",
            DispatchError::QueueResolution { .. } => "queue_resolution",
            DispatchError::AlreadyStarted => "already_started",
            DispatchError::ShutdownTimeout { .. } => "shutdown_timeout",
        }
    }
}

/// The body of a message could not be turned into the requested type.
///
/// `source` is whatever the [`BodyDeserializer`](crate::BodyDeserializer) in use failed with.
#[derive(Error, Debug)]
#[error("unable to deserialize body into {target}: {source}")]
pub struct DeserializationError {
    pub target: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl DeserializationError {
    pub fn new(
        target: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            target,
            source: source.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("cannot bind parameters from an empty batch")]
    EmptyBatch,

    #[error("there can only be one message when parameter is not a list: received={received}")]
    SingleMessageExpected { received: usize },

    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// A parameter without a resolvable role. Not reachable for validated consumers.
    #[error("parameter {index} has no binding role")]
    UnboundParameter { index: usize },
}

/// Raised by a handler while extracting a typed argument from [`Arguments`](crate::Arguments).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("no argument at index {index}")]
    Missing { index: usize },

    #[error("argument {index} was already taken")]
    AlreadyTaken { index: usize },

    #[error("argument {index} is bound as {actual}, not {expected}")]
    UnexpectedKind {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("argument {index} is not a {expected}")]
    TypeMismatch { index: usize, expected: &'static str },
}

/// # Errors produced by one poll cycle.
///
/// None of these stop the worker; the loop logs them and polls again.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PollError {
    /// Receiving failed. Nothing was fetched, so nothing is lost.
    #[error("failed to receive messages: {0}")]
    Receive(String),

    #[error("failed to bind consumer parameters: {0}")]
    Binding(#[from] BindingError),

    /// The handler returned an error or panicked.
    #[error("consumer handler failed: {0}")]
    Handler(HandlerError),

    /// The batch delete call itself failed.
    #[error("failed to delete messages: {0}")]
    Delete(String),
}

impl PollError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PollError::Receive(_) => "poll_receive",
            PollError::Binding(_) => "poll_binding",
            PollError::Handler(_) => "poll_handler",
            PollError::Delete(_) => "poll_delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_joins_messages_with_newlines() {
        let err = StartupValidationError {
            messages: vec!["first. Queue=a".into(), "second. Queue=b".into()],
        };

        assert_eq!(
            err.to_string(),
            "Some consumers are not well defined: errorMessages=first. Queue=a\nsecond. Queue=b"
        );
    }

    #[test]
    fn labels_are_stable() {
        let err = DispatchError::QueueResolution {
            queue: "orders".into(),
            reason: "not found".into(),
        };
        assert_eq!(err.as_label(), "queue_resolution");
        assert_eq!(PollError::Receive("boom".into()).as_label(), "poll_receive");
    }
}
