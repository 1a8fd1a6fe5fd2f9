//! This module provides the handler trait and the arguments a handler is invoked with.

use std::any::{Any, type_name};
use std::fmt;

use futures::future::BoxFuture;

use crate::ReceivedBatch;
use crate::error::{ArgumentError, HandlerError};

/// A trait for consumer handlers that define how to handle the messages of one queue.
///
/// The dispatcher binds each received batch to the handler's declared parameters and passes
/// them as [`Arguments`], in declared parameter order.
///
/// # Error Handling
///
/// Errors (and panics) are logged by the poll worker. Whether the batch is then deleted
/// depends on the consumer's [`DeletePolicy`](crate::DeletePolicy): under
/// `AfterProcessing` a failed batch is NOT deleted and will be redelivered by the queue,
/// under `BeforeProcessing` it was already deleted before the handler ran.
///
/// # Examples
///
/// ```rust
/// use sqs_dispatch::{Arguments, Handler, HandlerError};
/// use futures::future::BoxFuture;
///
/// struct AuditLog;
///
/// impl Handler for AuditLog {
///     fn call(&self, mut args: Arguments) -> BoxFuture<'_, Result<(), HandlerError>> {
///         Box::pin(async move {
///             let entry: String = args.body(0)?;
///             println!("audit: {entry}");
///             Ok::<(), HandlerError>(())
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Invoke the handler with the bound arguments
    fn call(&self, args: Arguments) -> BoxFuture<'_, Result<(), HandlerError>>;
}

/// A [`Handler`] backed by an async closure. See [`handler_fn`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure into a [`Handler`]
///
/// ```rust
/// use sqs_dispatch::{Arguments, HandlerError, handler_fn};
///
/// let handler = handler_fn(|mut args: Arguments| async move {
///     let body: String = args.body(0)?;
///     println!("{body}");
///     Ok::<(), HandlerError>(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, args: Arguments) -> BoxFuture<'_, Result<(), HandlerError>> {
        Box::pin((self.f)(args))
    }
}

/// A deserialized value of a type only known to the handler.
pub struct BoundValue {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl BoundValue {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Recover the concrete value, handing `self` back on a type mismatch
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Self { value, type_name })
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// One bound handler argument
#[derive(Debug)]
pub enum Argument {
    /// A single deserialized body
    Body(BoundValue),
    /// Every body of the batch, in receive order
    Bodies(Vec<BoundValue>),
    /// A message attribute; `None` when the message does not carry it
    Attribute(Option<String>),
    /// The whole received batch, untouched
    Envelope(ReceivedBatch),
}

impl Argument {
    fn kind(&self) -> &'static str {
        match self {
            Argument::Body(_) => "body",
            Argument::Bodies(_) => "bodies",
            Argument::Attribute(_) => "attribute",
            Argument::Envelope(_) => "envelope",
        }
    }
}

/// The ordered argument list a handler is invoked with.
///
/// Arguments are addressed by the index of the parameter they were bound for. Typed
/// accessors move the argument out; asking for the same index twice fails with
/// [`ArgumentError::AlreadyTaken`].
#[derive(Debug, Default)]
pub struct Arguments {
    slots: Vec<Option<Argument>>,
}

impl Arguments {
    pub fn new(arguments: Vec<Argument>) -> Self {
        Self {
            slots: arguments.into_iter().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Move the argument at `index` out of the list
    pub fn take(&mut self, index: usize) -> Result<Argument, ArgumentError> {
        self.slots
            .get_mut(index)
            .ok_or(ArgumentError::Missing { index })?
            .take()
            .ok_or(ArgumentError::AlreadyTaken { index })
    }

    /// Take a single body argument as `T`
    pub fn body<T: Any>(&mut self, index: usize) -> Result<T, ArgumentError> {
        match self.take(index)? {
            Argument::Body(value) => value.downcast::<T>().map_err(|value| {
                self.slots[index] = Some(Argument::Body(value));
                ArgumentError::TypeMismatch {
                    index,
                    expected: type_name::<T>(),
                }
            }),
            other => Err(self.restore(index, other, "body")),
        }
    }

    /// Take a collection body argument as `Vec<T>`, in receive order
    pub fn bodies<T: Any>(&mut self, index: usize) -> Result<Vec<T>, ArgumentError> {
        match self.take(index)? {
            Argument::Bodies(values) => {
                if values.iter().all(BoundValue::is::<T>) {
                    Ok(values
                        .into_iter()
                        .filter_map(|value| value.downcast::<T>().ok())
                        .collect())
                } else {
                    self.slots[index] = Some(Argument::Bodies(values));
                    Err(ArgumentError::TypeMismatch {
                        index,
                        expected: type_name::<T>(),
                    })
                }
            }
            other => Err(self.restore(index, other, "bodies")),
        }
    }

    /// Read an attribute argument without taking it
    pub fn attribute(&self, index: usize) -> Result<Option<&str>, ArgumentError> {
        match self.slots.get(index) {
            None => Err(ArgumentError::Missing { index }),
            Some(None) => Err(ArgumentError::AlreadyTaken { index }),
            Some(Some(Argument::Attribute(value))) => Ok(value.as_deref()),
            Some(Some(other)) => Err(ArgumentError::UnexpectedKind {
                index,
                expected: "attribute",
                actual: other.kind(),
            }),
        }
    }

    /// Take the raw envelope argument
    pub fn envelope(&mut self, index: usize) -> Result<ReceivedBatch, ArgumentError> {
        match self.take(index)? {
            Argument::Envelope(batch) => Ok(batch),
            other => Err(self.restore(index, other, "envelope")),
        }
    }

    pub fn into_vec(self) -> Vec<Option<Argument>> {
        self.slots
    }

    fn restore(&mut self, index: usize, argument: Argument, expected: &'static str) -> ArgumentError {
        let actual = argument.kind();
        self.slots[index] = Some(argument);
        ArgumentError::UnexpectedKind {
            index,
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Order {
        id: String,
    }

    fn order(id: &str) -> BoundValue {
        BoundValue::new(Order { id: id.into() })
    }

    #[test]
    fn body_is_taken_once() {
        let mut args = Arguments::new(vec![Argument::Body(order("42"))]);

        assert_eq!(args.body::<Order>(0), Ok(Order { id: "42".into() }));
        assert_eq!(
            args.body::<Order>(0),
            Err(ArgumentError::AlreadyTaken { index: 0 })
        );
    }

    #[test]
    fn type_mismatch_leaves_the_argument_in_place() {
        let mut args = Arguments::new(vec![Argument::Body(order("42"))]);

        assert!(matches!(
            args.body::<String>(0),
            Err(ArgumentError::TypeMismatch { index: 0, .. })
        ));
        assert_eq!(args.body::<Order>(0), Ok(Order { id: "42".into() }));
    }

    #[test]
    fn bodies_keep_order() {
        let mut args = Arguments::new(vec![Argument::Bodies(vec![order("1"), order("2")])]);

        let orders = args.bodies::<Order>(0).unwrap();

        assert_eq!(
            orders,
            vec![Order { id: "1".into() }, Order { id: "2".into() }]
        );
    }

    #[test]
    fn attribute_kind_is_checked() {
        let args = Arguments::new(vec![
            Argument::Attribute(Some("a".into())),
            Argument::Attribute(None),
            Argument::Body(order("1")),
        ]);

        assert_eq!(args.attribute(0), Ok(Some("a")));
        assert_eq!(args.attribute(1), Ok(None));
        assert_eq!(
            args.attribute(2),
            Err(ArgumentError::UnexpectedKind {
                index: 2,
                expected: "attribute",
                actual: "body"
            })
        );
        assert_eq!(args.attribute(3), Err(ArgumentError::Missing { index: 3 }));
    }
}
