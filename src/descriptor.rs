//! This module contains the consumer descriptor: the declarative configuration of one
//! consumer together with the handler it dispatches to and its parameter shape.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::handler::{BoundValue, Handler};
use crate::ReceivedBatch;

/// Default (and maximum) long polling wait time, in seconds
pub const DEFAULT_MAX_LONG_POLLING_IN_SECONDS: i32 = 20;
/// Wait time that disables long polling. Anything below this is not permitted.
pub const SHORT_POLLING_VALUE: i32 = 0;
pub const DEFAULT_MAX_MESSAGES_PER_POLL: i32 = 1;
/// Maximum number of messages a single receive call may return
pub const MAX_MESSAGES_PER_POLL_ALLOWED: i32 = 10;
pub const DEFAULT_CONCURRENT_CONSUMERS: i32 = 1;

/// When the messages of a batch are deleted relative to the handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletePolicy {
    /// Delete the batch, then invoke the handler. A failing handler loses the batch.
    BeforeProcessing,
    /// Invoke the handler and delete only if it succeeded. A failing handler leaves the
    /// batch for the queue to redeliver.
    #[default]
    AfterProcessing,
}

/// Configuration of one consumer
///
/// # Examples
///
/// ```rust
/// use sqs_dispatch::{ConsumerConfig, DeletePolicy};
///
/// let config = ConsumerConfig {
///     max_messages_per_poll: 10,
///     concurrency: 4,
///     ..ConsumerConfig::new("orders")
/// };
/// assert_eq!(config.wait_time_seconds, 20);
/// assert_eq!(config.delete_policy, DeletePolicy::AfterProcessing);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// The name of the queue to consume messages from
    pub queue_name: String,
    /// Long polling wait time, 0 to 20 seconds. 0 disables long polling.
    /// Default: 20
    pub wait_time_seconds: i32,
    /// Maximum number of messages fetched per receive call, 1 to 10
    /// Default: 1
    pub max_messages_per_poll: i32,
    /// Number of independent poll workers started for this consumer
    /// Default: 1
    pub concurrency: i32,
    /// Default: [`DeletePolicy::AfterProcessing`]
    pub delete_policy: DeletePolicy,
}

impl ConsumerConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue_name: String::new(),
            wait_time_seconds: DEFAULT_MAX_LONG_POLLING_IN_SECONDS,
            max_messages_per_poll: DEFAULT_MAX_MESSAGES_PER_POLL,
            concurrency: DEFAULT_CONCURRENT_CONSUMERS,
            delete_policy: DeletePolicy::default(),
        }
    }
}

type DecodeFn = fn(serde_json::Value) -> Result<BoundValue, serde_json::Error>;

#[derive(Clone, Copy)]
enum Shape {
    Envelope,
    Text,
    Structured(DecodeFn),
}

/// The type a parameter is bound to.
///
/// Captures what the binder needs to know about a handler parameter's type without runtime
/// reflection: its name, its identity, whether it is string-like and how a message body is
/// decoded into it.
#[derive(Clone, Copy)]
pub struct TargetType {
    name: &'static str,
    type_id: TypeId,
    shape: Shape,
}

impl TargetType {
    /// A type decoded from a structured (JSON) body
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self {
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            shape: Shape::Structured(decode_structured::<T>),
        }
    }

    /// The body text itself, as a `String`, without any decoding
    pub fn text() -> Self {
        Self {
            name: type_name::<String>(),
            type_id: TypeId::of::<String>(),
            shape: Shape::Text,
        }
    }

    /// The received batch as a whole
    pub fn envelope() -> Self {
        Self {
            name: type_name::<ReceivedBatch>(),
            type_id: TypeId::of::<ReceivedBatch>(),
            shape: Shape::Envelope,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is_envelope(&self) -> bool {
        matches!(self.shape, Shape::Envelope)
    }

    pub fn is_text(&self) -> bool {
        matches!(self.shape, Shape::Text)
    }

    pub fn is_string_like(&self) -> bool {
        self.is_text()
            || self.type_id == TypeId::of::<String>()
            || self.type_id == TypeId::of::<Option<String>>()
    }

    /// Turn an already parsed body into this type.
    ///
    /// Text targets accept a JSON string. Envelope targets cannot be decoded from a body.
    pub fn decode_value(&self, value: serde_json::Value) -> Result<BoundValue, serde_json::Error> {
        match self.shape {
            Shape::Structured(decode) => decode(value),
            Shape::Text => decode_structured::<String>(value),
            Shape::Envelope => Err(<serde_json::Error as serde::de::Error>::custom(
                "the message envelope cannot be decoded from a body",
            )),
        }
    }

    /// Returns `true` when values of this target are of type `T`
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

fn decode_structured<T>(value: serde_json::Value) -> Result<BoundValue, serde_json::Error>
where
    T: DeserializeOwned + Send + 'static,
{
    serde_json::from_value::<T>(value).map(BoundValue::new)
}

impl fmt::Debug for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.shape {
            Shape::Envelope => "envelope",
            Shape::Text => "text",
            Shape::Structured(_) => "structured",
        };
        f.debug_struct("TargetType")
            .field("name", &self.name)
            .field("shape", &shape)
            .finish()
    }
}

impl PartialEq for TargetType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.is_text() == other.is_text()
    }
}

/// A binding marker placed on a handler parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Bind the message body
    Body,
    /// Bind the named message attribute
    Attribute(String),
}

/// The role a parameter resolves to once its markers and position are taken into account
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterRole {
    Body,
    Attribute(String),
    RawEnvelope,
}

/// The declared shape of one handler parameter.
///
/// # Examples
///
/// ```rust
/// use sqs_dispatch::{Marker, ParameterRole, ParameterSpec};
/// # #[derive(serde::Deserialize)] struct Order;
///
/// // handler(k1: Option<String>, order: Order)
/// let parameters = vec![ParameterSpec::attribute("k1"), ParameterSpec::body::<Order>()];
/// assert_eq!(parameters[0].role(false), Some(ParameterRole::Attribute("k1".into())));
///
/// // a lone unmarked parameter is the body
/// assert_eq!(ParameterSpec::of::<Order>().role(true), Some(ParameterRole::Body));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    markers: Vec<Marker>,
    target: TargetType,
    collection: bool,
}

impl ParameterSpec {
    /// An unmarked parameter
    pub fn new(target: TargetType, collection: bool) -> Self {
        Self {
            markers: Vec::new(),
            target,
            collection,
        }
    }

    /// An unmarked scalar parameter of type `T`
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self::new(TargetType::of::<T>(), false)
    }

    /// An unmarked collection parameter with element type `T`
    pub fn list_of<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self::new(TargetType::of::<T>(), true)
    }

    /// A scalar parameter marked as the body
    pub fn body<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self::of::<T>().with_marker(Marker::Body)
    }

    /// A collection parameter marked as the body
    pub fn bodies<T>() -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self::list_of::<T>().with_marker(Marker::Body)
    }

    /// A string parameter marked with the named attribute
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::new(TargetType::text(), false).with_marker(Marker::Attribute(name.into()))
    }

    /// The raw received batch
    pub fn envelope() -> Self {
        Self::new(TargetType::envelope(), false)
    }

    /// Add a marker (builder pattern)
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn target(&self) -> &TargetType {
        &self.target
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    pub fn is_envelope(&self) -> bool {
        self.target.is_envelope()
    }

    pub fn has_body_marker(&self) -> bool {
        self.markers.contains(&Marker::Body)
    }

    pub fn has_attribute_marker(&self) -> bool {
        self.attribute_name().is_some()
    }

    /// Name of the first attribute marker, if any
    pub fn attribute_name(&self) -> Option<&str> {
        self.markers.iter().find_map(|marker| match marker {
            Marker::Attribute(name) => Some(name.as_str()),
            Marker::Body => None,
        })
    }

    /// Resolve the binding role.
    ///
    /// `single` tells whether this is the handler's only parameter: a lone parameter that is
    /// not the envelope is the body whatever its markers say.
    pub fn role(&self, single: bool) -> Option<ParameterRole> {
        if self.is_envelope() {
            return Some(ParameterRole::RawEnvelope);
        }
        if single {
            return Some(ParameterRole::Body);
        }
        self.markers.first().map(|marker| match marker {
            Marker::Body => ParameterRole::Body,
            Marker::Attribute(name) => ParameterRole::Attribute(name.clone()),
        })
    }
}

/// Whether a handler may be invoked from outside its defining component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exposure {
    #[default]
    Public,
    Private,
}

/// The handler a consumer dispatches to, with a name used in logs
#[derive(Clone)]
pub struct HandlerTarget {
    name: String,
    exposure: Exposure,
    handler: Arc<dyn Handler>,
}

impl HandlerTarget {
    pub fn new(name: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            name: name.into(),
            exposure: Exposure::Public,
            handler: Arc::new(handler),
        }
    }

    /// Set the exposure (builder pattern)
    pub fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl fmt::Debug for HandlerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTarget")
            .field("name", &self.name)
            .field("exposure", &self.exposure)
            .finish_non_exhaustive()
    }
}

struct DescriptorInner {
    target: HandlerTarget,
    parameters: Vec<ParameterSpec>,
    config: ConsumerConfig,
}

/// Immutable description of one consumer.
///
/// Cloning is cheap; every poll worker of the consumer holds a clone.
///
/// # Examples
///
/// ```rust
/// use sqs_dispatch::{Arguments, ConsumerDescriptor, DeletePolicy, HandlerError, ParameterSpec, handler_fn};
///
/// #[derive(Debug, serde::Deserialize)]
/// struct Order {
///     id: String,
/// }
///
/// let descriptor = ConsumerDescriptor::builder("orders")
///     .max_messages_per_poll(10)
///     .concurrency(2)
///     .delete_policy(DeletePolicy::AfterProcessing)
///     .parameter(ParameterSpec::bodies::<Order>())
///     .handler(
///         "orders::on_batch",
///         handler_fn(|mut args: Arguments| async move {
///             let orders: Vec<Order> = args.bodies(0)?;
///             println!("received {} orders", orders.len());
///             Ok::<(), HandlerError>(())
///         }),
///     );
///
/// assert_eq!(descriptor.queue_name(), "orders");
/// assert_eq!(descriptor.config().concurrency, 2);
/// ```
#[derive(Clone)]
pub struct ConsumerDescriptor {
    inner: Arc<DescriptorInner>,
}

impl ConsumerDescriptor {
    pub fn new(config: ConsumerConfig, parameters: Vec<ParameterSpec>, target: HandlerTarget) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                target,
                parameters,
                config,
            }),
        }
    }

    pub fn builder(queue_name: impl Into<String>) -> ConsumerDescriptorBuilder {
        ConsumerDescriptorBuilder {
            config: ConsumerConfig::new(queue_name),
            parameters: Vec::new(),
            exposure: Exposure::Public,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.inner.config.queue_name
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.inner.config
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.inner.parameters
    }

    pub fn target(&self) -> &HandlerTarget {
        &self.inner.target
    }

    pub fn is_single_parameter(&self) -> bool {
        self.inner.parameters.len() == 1
    }

    /// Resolved role of every parameter, in declared order
    pub fn roles(&self) -> Vec<Option<ParameterRole>> {
        let single = self.is_single_parameter();
        self.inner
            .parameters
            .iter()
            .map(|parameter| parameter.role(single))
            .collect()
    }

    /// The parameter that receives the body, if there is exactly one candidate
    pub fn body_parameter(&self) -> Option<&ParameterSpec> {
        let single = self.is_single_parameter();
        let mut bodies = self
            .inner
            .parameters
            .iter()
            .filter(|parameter| parameter.role(single) == Some(ParameterRole::Body));
        match (bodies.next(), bodies.next()) {
            (Some(body), None) => Some(body),
            _ => None,
        }
    }

    /// Names of the attributes bound by this consumer, in declared order
    pub fn attribute_names(&self) -> Vec<String> {
        self.roles()
            .into_iter()
            .filter_map(|role| match role {
                Some(ParameterRole::Attribute(name)) => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Debug for ConsumerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerDescriptor")
            .field("target", &self.inner.target)
            .field("parameters", &self.inner.parameters)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`ConsumerDescriptor`]; finished by [`handler`](Self::handler).
#[derive(Debug, Clone)]
pub struct ConsumerDescriptorBuilder {
    config: ConsumerConfig,
    parameters: Vec<ParameterSpec>,
    exposure: Exposure,
}

impl ConsumerDescriptorBuilder {
    /// Replace the whole configuration, keeping its own queue name
    pub fn config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn wait_time_seconds(mut self, seconds: i32) -> Self {
        self.config.wait_time_seconds = seconds;
        self
    }

    pub fn max_messages_per_poll(mut self, max: i32) -> Self {
        self.config.max_messages_per_poll = max;
        self
    }

    pub fn concurrency(mut self, concurrency: i32) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.config.delete_policy = policy;
        self
    }

    /// Append one parameter; parameters are bound in the order they are added
    pub fn parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    /// Attach the handler and build the descriptor
    pub fn handler(self, name: impl Into<String>, handler: impl Handler) -> ConsumerDescriptor {
        let target = HandlerTarget::new(name, handler).with_exposure(self.exposure);
        ConsumerDescriptor::new(self.config, self.parameters, target)
    }
}
