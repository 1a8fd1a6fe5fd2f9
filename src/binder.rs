//! This module turns a received batch into the argument list of a consumer's handler.

use std::fmt;
use std::sync::Arc;

use crate::error::{BindingError, DeserializationError};
use crate::handler::{Argument, Arguments, BoundValue};
use crate::{ConsumerDescriptor, Message, ParameterRole, ParameterSpec, ReceivedBatch, TargetType};

/// A trait for body deserializers that turn a message body into a parameter's type.
pub trait BodyDeserializer: Send + Sync {
    fn deserialize(&self, body: &str, target: &TargetType) -> Result<BoundValue, DeserializationError>;
}

/// Deserializes JSON bodies with `serde_json`.
///
/// Text targets ([`TargetType::text`]) receive the body unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBodyDeserializer;

impl BodyDeserializer for JsonBodyDeserializer {
    fn deserialize(&self, body: &str, target: &TargetType) -> Result<BoundValue, DeserializationError> {
        if target.is_text() {
            return Ok(BoundValue::new(body.to_owned()));
        }

        serde_json::from_str::<serde_json::Value>(body)
            .and_then(|value| target.decode_value(value))
            .map_err(|source| {
                tracing::error!(target_type = target.name(), body, "unable to deserialize body");
                DeserializationError::new(target.name(), source)
            })
    }
}

/// Binds received batches to handler parameters.
///
/// - A lone envelope parameter receives the whole batch.
/// - A lone scalar parameter receives the first message's body.
/// - A lone collection parameter receives every body, in receive order.
/// - With several parameters, each is bound by its marker: attributes are read from the
///   first message (a missing attribute binds `None`), a scalar body requires a batch of
///   exactly one message, a collection body receives every body.
#[derive(Clone)]
pub struct ParameterBinder {
    deserializer: Arc<dyn BodyDeserializer>,
}

impl ParameterBinder {
    pub fn new(deserializer: Arc<dyn BodyDeserializer>) -> Self {
        Self { deserializer }
    }

    pub fn bind(
        &self,
        descriptor: &ConsumerDescriptor,
        batch: &ReceivedBatch,
    ) -> Result<Arguments, BindingError> {
        let arguments = match descriptor.parameters() {
            [] => Vec::new(),
            [only] => vec![self.bind_single(only, batch)?],
            parameters => parameters
                .iter()
                .enumerate()
                .map(|(index, parameter)| self.bind_marked(index, parameter, batch))
                .collect::<Result<Vec<_>, _>>()?,
        };

        tracing::trace!(
            queue = descriptor.queue_name(),
            argument_count = arguments.len(),
            message_count = batch.len(),
            "bound consumer parameters"
        );

        Ok(Arguments::new(arguments))
    }

    fn bind_single(&self, parameter: &ParameterSpec, batch: &ReceivedBatch) -> Result<Argument, BindingError> {
        if parameter.is_envelope() {
            return Ok(Argument::Envelope(batch.clone()));
        }
        if parameter.is_collection() {
            return self.bodies(parameter, batch).map(Argument::Bodies);
        }
        self.body(parameter, first(batch)?).map(Argument::Body)
    }

    fn bind_marked(
        &self,
        index: usize,
        parameter: &ParameterSpec,
        batch: &ReceivedBatch,
    ) -> Result<Argument, BindingError> {
        match parameter.role(false) {
            Some(ParameterRole::Attribute(name)) => {
                let value = first(batch)?.attribute(&name).map(str::to_owned);
                Ok(Argument::Attribute(value))
            }
            Some(ParameterRole::Body) if parameter.is_collection() => {
                self.bodies(parameter, batch).map(Argument::Bodies)
            }
            Some(ParameterRole::Body) => match batch.messages() {
                [message] => self.body(parameter, message).map(Argument::Body),
                messages => Err(BindingError::SingleMessageExpected {
                    received: messages.len(),
                }),
            },
            Some(ParameterRole::RawEnvelope) => Ok(Argument::Envelope(batch.clone())),
            None => Err(BindingError::UnboundParameter { index }),
        }
    }

    fn body(&self, parameter: &ParameterSpec, message: &Message) -> Result<BoundValue, BindingError> {
        Ok(self.deserializer.deserialize(&message.body, parameter.target())?)
    }

    fn bodies(&self, parameter: &ParameterSpec, batch: &ReceivedBatch) -> Result<Vec<BoundValue>, BindingError> {
        batch
            .messages()
            .iter()
            .map(|message| self.body(parameter, message))
            .collect()
    }
}

impl Default for ParameterBinder {
    fn default() -> Self {
        Self::new(Arc::new(JsonBodyDeserializer))
    }
}

impl fmt::Debug for ParameterBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterBinder").finish_non_exhaustive()
    }
}

fn first(batch: &ReceivedBatch) -> Result<&Message, BindingError> {
    batch.first().ok_or(BindingError::EmptyBatch)
}
