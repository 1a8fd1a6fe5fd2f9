//! AWS SQS transport, enabled with the `sqs` feature.

use std::collections::HashMap;

use aws_sdk_sqs::types::DeleteMessageBatchRequestEntry;
use thiserror::Error;

use crate::{DeleteBatchOutcome, DeleteEntry, FailedDelete, Message, QueueAddress, QueueTransport, ReceiveRequest};

#[derive(Error, Debug)]
pub enum SqsTransportError {
    #[error(transparent)]
    Sdk(#[from] aws_sdk_sqs::Error),

    #[error("no url returned for queue {0}")]
    MissingQueueUrl(String),

    #[error(transparent)]
    Build(#[from] aws_sdk_sqs::error::BuildError),
}

/// [`QueueTransport`] over an `aws_sdk_sqs::Client`.
///
/// Queue names are resolved with `GetQueueUrl`, and the queue url is the [`QueueAddress`].
/// Attributes a consumer binds are fetched as SQS message attributes.
#[derive(Clone, Debug)]
pub struct SqsTransport {
    inner: aws_sdk_sqs::Client,
}

impl SqsTransport {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { inner: client }
    }

    /// Build a client from the default AWS configuration chain
    pub async fn from_env() -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sqs::Client::new(&aws_config))
    }

    pub fn client(&self) -> &aws_sdk_sqs::Client {
        &self.inner
    }
}

impl QueueTransport for SqsTransport {
    type Error = SqsTransportError;

    async fn resolve_queue_address(&self, name: &str) -> Result<QueueAddress, Self::Error> {
        let output = self
            .inner
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        output
            .queue_url()
            .map(QueueAddress::new)
            .ok_or_else(|| SqsTransportError::MissingQueueUrl(name.to_owned()))
    }

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, Self::Error> {
        let attribute_names =
            (!request.attribute_names.is_empty()).then(|| request.attribute_names.clone());

        let recv_output = self
            .inner
            .receive_message()
            .queue_url(request.address.as_str())
            .wait_time_seconds(request.wait_time_seconds)
            .max_number_of_messages(request.max_messages)
            .set_message_attribute_names(attribute_names)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        Ok(recv_output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(into_message)
            .collect())
    }

    async fn delete_batch(
        &self,
        address: &QueueAddress,
        entries: Vec<DeleteEntry>,
    ) -> Result<DeleteBatchOutcome, Self::Error> {
        let entries = entries
            .into_iter()
            .map(|entry| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .receipt_handle(entry.receipt_handle)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .inner
            .delete_message_batch()
            .queue_url(address.as_str())
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        Ok(DeleteBatchOutcome {
            succeeded: output
                .successful()
                .iter()
                .map(|entry| entry.id().to_owned())
                .collect(),
            failed: output
                .failed()
                .iter()
                .map(|entry| FailedDelete {
                    id: entry.id().to_owned(),
                    code: entry.code().to_owned(),
                    reason: entry.message().unwrap_or_default().to_owned(),
                })
                .collect(),
        })
    }
}

fn into_message(message: aws_sdk_sqs::types::Message) -> Message {
    let attributes: HashMap<String, String> = message
        .message_attributes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| value.string_value.map(|v| (name, v)))
        .collect();

    Message {
        id: message.message_id.unwrap_or_default(),
        receipt_handle: message.receipt_handle.unwrap_or_default(),
        body: message.body.unwrap_or_default(),
        attributes,
    }
}
