//! # Consumer validation.
//!
//! Every consumer is checked once, at startup, against a set of independent rules. The
//! [`RuleBasedValidator`] runs every rule on every consumer and merges all violations into
//! one [`StartupValidationError`], so a broken configuration is reported in full and no
//! worker starts.
//!
//! Rules are data: a custom check is added with [`RuleBasedValidator::add_rule`], either as
//! a type implementing [`ValidationRule`] or as a closure wrapped with [`rule_fn`].

use std::fmt;

use crate::ConsumerDescriptor;
use crate::error::StartupValidationError;

pub mod rules;

pub use rules::{
    AttributeTypeRule, ConcurrentConsumersRule, ConsumerAccessibleRule, ConsumerParametersRule,
    LongPollingRule, ParameterMarkersRule, PollMaxMessagesRule, PollMaxMessagesWithAttributesRule,
    RawEnvelopeOnlyParameterRule, RawEnvelopeWithoutMarkersRule,
};

/// Accumulates the messages of the checks a rule ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMessage {
    messages: Vec<String>,
}

impl ErrorMessage {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    /// An error with the given message unless `holds` is true
    pub fn unless(holds: bool, message: impl FnOnce() -> String) -> Self {
        if holds {
            Self::none()
        } else {
            Self::of(message())
        }
    }

    /// Merge another result into this one, skipping messages already present
    pub fn add(mut self, other: ErrorMessage) -> Self {
        for message in other.messages {
            if !self.messages.contains(&message) {
                self.messages.push(message);
            }
        }
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn text(&self) -> String {
        self.messages.join("\n")
    }
}

/// A single invariant over one consumer.
///
/// Rules must be pure: the same descriptor always yields the same messages.
pub trait ValidationRule: Send + Sync {
    /// Stable name of the rule; a validator holds at most one rule per name
    fn name(&self) -> &'static str;

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage;
}

/// A rule backed by a closure. See [`rule_fn`].
pub struct FnRule<F> {
    name: &'static str,
    f: F,
}

/// Turn a closure into a [`ValidationRule`]
///
/// ```rust
/// use sqs_dispatch::validation::{ErrorMessage, RuleBasedValidator, rule_fn};
///
/// let mut validator = RuleBasedValidator::with_default_rules();
/// validator.add_rule(rule_fn("queue_prefix", |descriptor| {
///     ErrorMessage::unless(descriptor.queue_name().starts_with("prod-"), || {
///         format!("Queue names must start with prod-. Queue={}", descriptor.queue_name())
///     })
/// }));
/// ```
pub fn rule_fn<F>(name: &'static str, f: F) -> FnRule<F>
where
    F: Fn(&ConsumerDescriptor) -> ErrorMessage + Send + Sync,
{
    FnRule { name, f }
}

impl<F> ValidationRule for FnRule<F>
where
    F: Fn(&ConsumerDescriptor) -> ErrorMessage + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, descriptor: &ConsumerDescriptor) -> ErrorMessage {
        (self.f)(descriptor)
    }
}

/// Outcome of one rule on one consumer
#[derive(Debug, Clone)]
pub struct ValidationResult<'a> {
    pub descriptor: &'a ConsumerDescriptor,
    pub rule: &'static str,
    pub errors: ErrorMessage,
}

impl ValidationResult<'_> {
    pub fn is_valid(&self) -> bool {
        !self.errors.has_errors()
    }

    pub fn error_text(&self) -> String {
        self.errors.text()
    }
}

/// Runs a set of [`ValidationRule`]s over every consumer
pub struct RuleBasedValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl RuleBasedValidator {
    /// A validator without any rule
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// A validator holding every built-in rule
    pub fn with_default_rules() -> Self {
        let mut validator = Self::new();
        validator.add_rule(ConsumerParametersRule);
        validator.add_rule(RawEnvelopeOnlyParameterRule);
        validator.add_rule(RawEnvelopeWithoutMarkersRule);
        validator.add_rule(ParameterMarkersRule);
        validator.add_rule(AttributeTypeRule);
        validator.add_rule(PollMaxMessagesWithAttributesRule);
        validator.add_rule(PollMaxMessagesRule);
        validator.add_rule(LongPollingRule);
        validator.add_rule(ConcurrentConsumersRule);
        validator.add_rule(ConsumerAccessibleRule);
        validator
    }

    /// Add a rule. Returns `false` if a rule with the same name is already present.
    pub fn add_rule(&mut self, rule: impl ValidationRule + 'static) -> bool {
        if self.rules.iter().any(|existing| existing.name() == rule.name()) {
            return false;
        }
        self.rules.push(Box::new(rule));
        true
    }

    /// Names of the rules, in the order they run
    pub fn rules(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// One result per (consumer, rule) pair, consumers first
    pub fn results<'a>(&self, descriptors: &'a [ConsumerDescriptor]) -> Vec<ValidationResult<'a>> {
        descriptors
            .iter()
            .flat_map(|descriptor| {
                self.rules.iter().map(move |rule| ValidationResult {
                    descriptor,
                    rule: rule.name(),
                    errors: rule.check(descriptor),
                })
            })
            .collect()
    }

    /// Check every consumer, failing with every violation found
    pub fn validate(&self, descriptors: &[ConsumerDescriptor]) -> Result<(), StartupValidationError> {
        let messages = self
            .results(descriptors)
            .into_iter()
            .filter(|result| !result.is_valid())
            .flat_map(|result| result.errors.messages)
            .collect::<Vec<_>>();

        if messages.is_empty() {
            tracing::debug!(
                consumer_count = descriptors.len(),
                rule_count = self.rules.len(),
                "consumers validated"
            );
            return Ok(());
        }

        let error = StartupValidationError { messages };
        tracing::error!(error = %error, "consumer validation failed");
        Err(error)
    }
}

impl Default for RuleBasedValidator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl fmt::Debug for RuleBasedValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBasedValidator")
            .field("rules", &self.rules())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arguments, HandlerError, ParameterSpec, handler_fn};

    fn consumer(queue: &str, concurrency: i32) -> ConsumerDescriptor {
        ConsumerDescriptor::builder(queue)
            .concurrency(concurrency)
            .parameter(ParameterSpec::of::<String>())
            .handler(
                "tests::noop",
                handler_fn(|_args: Arguments| async { Ok::<(), HandlerError>(()) }),
            )
    }

    #[test]
    fn valid_consumers_pass() {
        let validator = RuleBasedValidator::with_default_rules();

        assert!(validator.validate(&[consumer("a", 1), consumer("b", 5)]).is_ok());
    }

    #[test]
    fn errors_are_merged_across_consumers() {
        let validator = RuleBasedValidator::with_default_rules();

        let err = validator
            .validate(&[consumer("a", 0), consumer("b", 1), consumer("c", -1)])
            .unwrap_err();

        assert_eq!(
            err.messages,
            vec![
                "The number of concurrent consumers must be greater than 0. Queue=a",
                "The number of concurrent consumers must be greater than 0. Queue=c",
            ]
        );
    }

    #[test]
    fn validation_is_repeatable() {
        let validator = RuleBasedValidator::with_default_rules();
        let consumers = [consumer("a", 0)];

        let first = validator.validate(&consumers);
        let second = validator.validate(&consumers);

        assert_eq!(first, second);
    }

    #[test]
    fn rules_are_unique_by_name() {
        let mut validator = RuleBasedValidator::with_default_rules();

        assert!(!validator.add_rule(ConcurrentConsumersRule));
        assert!(validator.add_rule(rule_fn("always_fails", |descriptor| {
            ErrorMessage::of(format!("nope. Queue={}", descriptor.queue_name()))
        })));
        assert_eq!(validator.rules().len(), 11);

        let err = validator.validate(&[consumer("a", 1)]).unwrap_err();
        assert_eq!(err.messages, vec!["nope. Queue=a"]);
    }

    #[test]
    fn one_result_per_consumer_and_rule() {
        let validator = RuleBasedValidator::with_default_rules();
        let consumers = [consumer("a", 1), consumer("b", 0)];

        let results = validator.results(&consumers);

        assert_eq!(results.len(), 20);
        assert_eq!(results.iter().filter(|result| !result.is_valid()).count(), 1);
    }

    #[test]
    fn error_message_skips_duplicates() {
        let errors = ErrorMessage::of("a").add(ErrorMessage::of("a")).add(ErrorMessage::of("b"));

        assert_eq!(errors.text(), "a\nb");
    }
}
