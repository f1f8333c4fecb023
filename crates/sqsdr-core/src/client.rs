//! The operations the routing engine needs from a queue service.

use crate::error::{BatchFailure, Result};
use crate::message::{Message, MessageAttribute};
use async_trait::async_trait;
use std::collections::HashMap;

/// Queue services cap every batch request at this many entries.
pub const MAX_BATCH_SIZE: usize = 10;

/// Longest long-poll wait a receive may request.
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_number_of_messages: i32,
    pub wait_time_seconds: i32,
}

/// One message of a batch send, keyed by a batch-local id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendEntry {
    pub id: String,
    pub body: Option<String>,
    pub message_attributes: HashMap<String, MessageAttribute>,
}

impl From<&Message> for SendEntry {
    fn from(message: &Message) -> Self {
        Self {
            id: message.message_id.clone(),
            body: message.body.clone(),
            message_attributes: message.message_attributes.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendBatchOutput {
    /// Ids of the entries the service accepted
    pub successful: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

/// One message of a batch delete, keyed by a batch-local id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

impl From<&Message> for DeleteEntry {
    fn from(message: &Message) -> Self {
        Self {
            id: message.message_id.clone(),
            receipt_handle: message.receipt_handle.clone(),
        }
    }
}

/// Queue operations, addressed by queue URL once a name has been resolved.
///
/// Receives always ask for every system and custom attribute.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn receive_batch(&self, queue_url: &str, request: ReceiveRequest)
        -> Result<Vec<Message>>;

    async fn send_batch(&self, queue_url: &str, entries: Vec<SendEntry>)
        -> Result<SendBatchOutput>;

    /// Returns the entries that could not be deleted.
    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteEntry>,
    ) -> Result<Vec<BatchFailure>>;

    /// Creating a queue that already exists returns its URL.
    async fn create_queue(&self, name: &str) -> Result<String>;

    async fn delete_queue(&self, queue_url: &str) -> Result<()>;

    /// Fails with [`Error::QueueNotFound`](crate::Error::QueueNotFound) when
    /// no queue has that name.
    async fn resolve_queue_url(&self, name: &str) -> Result<String>;
}
