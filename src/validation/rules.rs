//! The built-in validation rules.

use crate::descriptor::{
    DEFAULT_MAX_LONG_POLLING_IN_SECONDS, Exposure, MAX_MESSAGES_PER_POLL_ALLOWED,
    SHORT_POLLING_VALUE,
};
use crate::{ConsumerDescriptor, Marker};

use super::{ErrorMessage, ValidationRule};

const MIN_MESSAGES_PER_POLL: i32 = 1;
const MIN_CONCURRENT_CONSUMERS: i32 = 1;

/// A consumer must declare at least one parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumerParametersRule;

impl ValidationRule for ConsumerParametersRule {
    fn name(&self) -> &'static str {
        "consumer_parameters"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        ErrorMessage::unless(!descriptor.parameters().is_empty(), || {
            format!(
                "A consumer must have at least one parameter. Queue={}",
                descriptor.queue_name()
            )
        })
    }
}

/// The raw envelope can only be bound as a consumer's only parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEnvelopeOnlyParameterRule;

impl ValidationRule for RawEnvelopeOnlyParameterRule {
    fn name(&self) -> &'static str {
        "raw_envelope_only_parameter"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        let has_envelope = descriptor.parameters().iter().any(|p| p.is_envelope());
        ErrorMessage::unless(!has_envelope || descriptor.is_single_parameter(), || {
            format!(
                "Cannot map the message envelope in a multi parameter consumer. Queue={}",
                descriptor.queue_name()
            )
        })
    }
}

/// The raw envelope parameter carries no body or attribute marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEnvelopeWithoutMarkersRule;

impl ValidationRule for RawEnvelopeWithoutMarkersRule {
    fn name(&self) -> &'static str {
        "raw_envelope_without_markers"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        let marked_envelope = descriptor
            .parameters()
            .iter()
            .any(|p| p.is_envelope() && !p.markers().is_empty());
        ErrorMessage::unless(!marked_envelope, || {
            format!(
                "A consumer expecting the message envelope cannot use body or attribute markers. Queue={}",
                descriptor.queue_name()
            )
        })
    }
}

/// Markers must identify each parameter's role without ambiguity.
///
/// A single parameter is the body and cannot be marked as an attribute. With more than one
/// parameter, every parameter carries exactly one marker and exactly one is the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterMarkersRule;

impl ValidationRule for ParameterMarkersRule {
    fn name(&self) -> &'static str {
        "parameter_markers"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        let parameters = descriptor.parameters();
        let queue = descriptor.queue_name();

        match parameters {
            [] => ErrorMessage::none(),
            [only] => ErrorMessage::unless(only.is_envelope() || !only.has_attribute_marker(), || {
                format!(
                    "Body must be the only marker when there is a single parameter. Queue={queue}"
                )
            }),
            _ => {
                let one_marker_each = parameters.iter().all(|p| p.markers().len() == 1);
                let body_count = parameters.iter().filter(|p| p.has_body_marker()).count();

                ErrorMessage::unless(one_marker_each, || {
                    format!("A consumer parameter must have exactly one marker. Queue={queue}")
                })
                .add(ErrorMessage::unless(body_count == 1, || {
                    format!(
                        "The body marker must appear once in the definition of a consumer. Queue={queue}"
                    )
                }))
            }
        }
    }
}

/// Attributes can only be bound to string-like parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeTypeRule;

impl ValidationRule for AttributeTypeRule {
    fn name(&self) -> &'static str {
        "attribute_type"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        let valid = descriptor
            .parameters()
            .iter()
            .filter(|p| p.has_attribute_marker())
            .all(|p| p.target().is_string_like() && !p.is_collection());
        ErrorMessage::unless(valid, || {
            format!(
                "All parameters mapped to message attributes must be of type String. Queue={}",
                descriptor.queue_name()
            )
        })
    }
}

/// Attributes are read from a single message, so they require polling one message at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollMaxMessagesWithAttributesRule;

impl ValidationRule for PollMaxMessagesWithAttributesRule {
    fn name(&self) -> &'static str {
        "poll_max_messages_with_attributes"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        let has_attributes = descriptor.parameters().iter().any(|p| {
            p.markers()
                .iter()
                .any(|marker| matches!(marker, Marker::Attribute(_)))
        });
        ErrorMessage::unless(
            !has_attributes || descriptor.config().max_messages_per_poll == 1,
            || {
                format!(
                    "Number of messages to poll can only be one when attributes are expected. Queue={}",
                    descriptor.queue_name()
                )
            },
        )
    }
}

/// Batch size limits, and batches larger than one need a collection body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollMaxMessagesRule;

impl ValidationRule for PollMaxMessagesRule {
    fn name(&self) -> &'static str {
        "poll_max_messages"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        let max = descriptor.config().max_messages_per_poll;
        let queue = descriptor.queue_name();
        let scalar_body = descriptor
            .body_parameter()
            .is_some_and(|body| !body.is_collection());

        ErrorMessage::unless(max >= MIN_MESSAGES_PER_POLL, || {
            format!(
                "Minimum number of messages per poll is {MIN_MESSAGES_PER_POLL}. Queue={queue}"
            )
        })
        .add(ErrorMessage::unless(max <= MAX_MESSAGES_PER_POLL_ALLOWED, || {
            format!(
                "Maximum number of messages per poll is {MAX_MESSAGES_PER_POLL_ALLOWED}. Queue={queue}"
            )
        }))
        .add(ErrorMessage::unless(!(scalar_body && max > 1), || {
            format!(
                "Cannot map to single instance parameter when maxMessagesPerPoll is more than 1. Queue={queue}"
            )
        }))
    }
}

/// Long polling wait time limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongPollingRule;

impl ValidationRule for LongPollingRule {
    fn name(&self) -> &'static str {
        "long_polling"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        let wait = descriptor.config().wait_time_seconds;
        let queue = descriptor.queue_name();

        ErrorMessage::unless(wait >= SHORT_POLLING_VALUE, || {
            format!("Minimum long polling value is {SHORT_POLLING_VALUE} (Disabled). Queue={queue}")
        })
        .add(ErrorMessage::unless(
            wait <= DEFAULT_MAX_LONG_POLLING_IN_SECONDS,
            || {
                format!(
                    "Maximum long polling value is {DEFAULT_MAX_LONG_POLLING_IN_SECONDS}. Queue={queue}"
                )
            },
        ))
    }
}

/// At least one worker per consumer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrentConsumersRule;

impl ValidationRule for ConcurrentConsumersRule {
    fn name(&self) -> &'static str {
        "concurrent_consumers"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        ErrorMessage::unless(
            descriptor.config().concurrency >= MIN_CONCURRENT_CONSUMERS,
            || {
                format!(
                    "The number of concurrent consumers must be greater than 0. Queue={}",
                    descriptor.queue_name()
                )
            },
        )
    }
}

/// The handler must be publicly exposed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumerAccessibleRule;

impl ValidationRule for ConsumerAccessibleRule {
    fn name(&self) -> &'static str {
        "consumer_accessible"
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        ErrorMessage::unless(descriptor.target().exposure() == Exposure::Public, || {
            format!(
                "The consumer handler is not accessible. The handler should be public. Queue={}",
                descriptor.queue_name()
            )
        })
    }
}
