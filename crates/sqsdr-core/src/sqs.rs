//! [`QueueService`] backed by AWS SQS.

use crate::client::{DeleteEntry, QueueService, ReceiveRequest, SendBatchOutput, SendEntry};
use crate::error::{BatchFailure, Error, Result};
use crate::message::Message;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs as sqs;
use aws_sdk_sqs::error::DisplayErrorContext;
use std::collections::HashMap;

/// Receives messages from an SQS queue.
///
/// Long-polls for up to `request.wait_time_seconds` and asks for every system
/// and custom attribute, so that forwarded and dumped messages keep them.
///
/// # Errors
///
/// Returns an error if the SQS API call fails.
pub async fn receive(
    client: &sqs::Client,
    queue_url: &str,
    request: ReceiveRequest,
) -> Result<sqs::operation::receive_message::ReceiveMessageOutput> {
    client
        .receive_message()
        .queue_url(queue_url)
        .max_number_of_messages(request.max_number_of_messages)
        .wait_time_seconds(request.wait_time_seconds)
        .message_system_attribute_names(sqs::types::MessageSystemAttributeName::All)
        .message_attribute_names("All")
        .send()
        .await
        .map_err(|e| {
            Error::service(
                "ReceiveMessage",
                queue_url,
                DisplayErrorContext(&e).to_string(),
            )
        })
}

fn failures(entries: &[sqs::types::BatchResultErrorEntry]) -> Vec<BatchFailure> {
    entries
        .iter()
        .map(|entry| BatchFailure {
            id: entry.id().to_string(),
            message: entry.message().map(ToString::to_string),
            sender_fault: entry.sender_fault(),
        })
        .collect()
}

/// Client for the SQS queues of one region.
///
/// # Example
///
/// ```no_run
/// use sqsdr::{QueueService, SqsQueueService};
///
/// # async fn example() -> sqsdr::Result<()> {
/// let config = aws_config::from_env().load().await;
/// let service = SqsQueueService::from_config(config);
///
/// let url = service.resolve_queue_url("my-dlq").await?;
/// println!("Queue: {}", url);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SqsQueueService {
    /// The AWS SDK configuration used for SQS operations
    pub config: SdkConfig,
    /// The SQS client instance
    pub client: sqs::Client,
}

impl SqsQueueService {
    /// Creates a service from a pre-built AWS SDK config.
    ///
    /// The caller decides on credentials and endpoints, e.g. LocalStack for
    /// `--local`.
    pub fn from_config(config: SdkConfig) -> Self {
        let client = sqs::Client::new(&config);
        Self { config, client }
    }

    fn region(&self) -> String {
        self.config
            .region()
            .map(ToString::to_string)
            .unwrap_or_else(|| "the default region".to_string())
    }
}

#[async_trait]
impl QueueService for SqsQueueService {
    async fn receive_batch(
        &self,
        queue_url: &str,
        request: ReceiveRequest,
    ) -> Result<Vec<Message>> {
        let output = receive(&self.client, queue_url, request).await?;

        output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        entries: Vec<SendEntry>,
    ) -> Result<SendBatchOutput> {
        // SQS rejects empty batch requests
        if entries.is_empty() {
            return Ok(SendBatchOutput::default());
        }

        let entries = entries
            .iter()
            .map(|entry| {
                let attributes = entry
                    .message_attributes
                    .iter()
                    .map(|(name, value)| {
                        Ok((name.clone(), sqs::types::MessageAttributeValue::try_from(value)?))
                    })
                    .collect::<Result<HashMap<_, _>>>()?;

                sqs::types::SendMessageBatchRequestEntry::builder()
                    .id(&entry.id)
                    .set_message_body(entry.body.clone())
                    .set_message_attributes(Some(attributes))
                    .build()
                    .map_err(|e| Error::MalformedMessage(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .send_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| {
                Error::service("SendMessageBatch", queue_url, DisplayErrorContext(&e).to_string())
            })?;

        Ok(SendBatchOutput {
            successful: output
                .successful()
                .iter()
                .map(|entry| entry.id().to_string())
                .collect(),
            failed: failures(output.failed()),
        })
    }

    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteEntry>,
    ) -> Result<Vec<BatchFailure>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let entries = entries
            .into_iter()
            .map(|entry| {
                sqs::types::DeleteMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .receipt_handle(entry.receipt_handle)
                    .build()
                    .map_err(|e| Error::MalformedMessage(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .delete_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| {
                Error::service(
                    "DeleteMessageBatch",
                    queue_url,
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        Ok(failures(output.failed()))
    }

    async fn create_queue(&self, name: &str) -> Result<String> {
        // SQS answers successfully when a queue with identical attributes exists
        let output = self
            .client
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| {
                Error::service("CreateQueue", name, DisplayErrorContext(&e).to_string())
            })?;

        output
            .queue_url
            .ok_or_else(|| {
                Error::service("CreateQueue", name, "response did not include a queue URL")
            })
    }

    async fn delete_queue(&self, queue_url: &str) -> Result<()> {
        self.client
            .delete_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| {
                Error::service("DeleteQueue", queue_url, DisplayErrorContext(&e).to_string())
            })?;

        Ok(())
    }

    async fn resolve_queue_url(&self, name: &str) -> Result<String> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_queue_does_not_exist())
                    .unwrap_or(false);

                if missing {
                    Error::QueueNotFound {
                        name: name.to_string(),
                        region: self.region(),
                    }
                } else {
                    Error::service("GetQueueUrl", name, DisplayErrorContext(&e).to_string())
                }
            })?;

        output
            .queue_url
            .ok_or_else(|| Error::QueueNotFound {
                name: name.to_string(),
                region: self.region(),
            })
    }
}
