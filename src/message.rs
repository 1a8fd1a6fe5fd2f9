//! This module contains the message types exchanged with the queue transport.

use std::collections::HashMap;
use std::fmt;

/// Address of a queue as understood by the transport (for SQS, the queue URL).
///
/// Produced by [`QueueTransport::resolve_queue_address`](crate::QueueTransport::resolve_queue_address)
/// from the logical queue name configured on a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueAddress(String);

impl QueueAddress {
    /// Create a new queue address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single message fetched from the queue.
///
/// The message body is kept as text; turning it into a handler argument is the job of the
/// [`ParameterBinder`](crate::ParameterBinder). The `id` and `receipt_handle` pair is what
/// the transport needs to delete the message once the delete policy allows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Queue-assigned message id
    pub id: String,
    /// Queue-specific handle required to delete this delivery of the message
    pub receipt_handle: String,
    /// The raw message body
    pub body: String,
    /// Message attributes keyed by name
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Create a new message without attributes
    pub fn new(
        id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Attach an attribute (builder pattern)
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub(crate) fn delete_entry(&self) -> DeleteEntry {
        DeleteEntry {
            id: self.id.clone(),
            receipt_handle: self.receipt_handle.clone(),
        }
    }
}

/// The messages returned by one receive call, in receive order.
///
/// This is also the value handed to a handler whose only parameter is the raw envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedBatch {
    messages: Vec<Message>,
}

impl ReceivedBatch {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn first(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// One delete entry per message, covering the whole batch
    pub fn delete_entries(&self) -> Vec<DeleteEntry> {
        self.messages.iter().map(Message::delete_entry).collect()
    }
}

impl From<Vec<Message>> for ReceivedBatch {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

/// Identifies one message in a batch delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

/// A message the transport failed to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelete {
    pub id: String,
    pub code: String,
    pub reason: String,
}

/// Result of a batch delete call that itself succeeded.
///
/// Individual entries may still have failed; those are listed in `failed` and are only
/// logged by the dispatcher, never retried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteBatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedDelete>,
}

impl DeleteBatchOutcome {
    /// An outcome where every entry was deleted
    pub fn all_succeeded(entries: &[DeleteEntry]) -> Self {
        Self {
            succeeded: entries.iter().map(|entry| entry.id.clone()).collect(),
            failed: Vec::new(),
        }
    }

    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_entries_cover_the_whole_batch_in_order() {
        let batch = ReceivedBatch::new(vec![
            Message::new("1", "rh-1", "{}"),
            Message::new("2", "rh-2", "{}"),
        ]);

        let entries = batch.delete_entries();

        assert_eq!(
            entries,
            vec![
                DeleteEntry {
                    id: "1".into(),
                    receipt_handle: "rh-1".into()
                },
                DeleteEntry {
                    id: "2".into(),
                    receipt_handle: "rh-2".into()
                },
            ]
        );
    }

    #[test]
    fn missing_attribute_is_none() {
        let message = Message::new("1", "rh-1", "{}").with_attribute("k1", "a");

        assert_eq!(message.attribute("k1"), Some("a"));
        assert_eq!(message.attribute("k2"), None);
    }
}
