//! In-memory [`QueueService`] for tests and dry runs.
//!
//! Queues behave like SQS with an infinite visibility timeout: a received
//! message stays in flight until it is deleted with its receipt handle or
//! until [`MemoryQueueService::expire_in_flight`] makes it visible again.
//! Faults can be scripted to exercise partial batch failures.

use crate::client::{DeleteEntry, QueueService, ReceiveRequest, SendBatchOutput, SendEntry};
use crate::error::{BatchFailure, Error, Result};
use crate::message::{Message, MessageAttribute};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

const URL_PREFIX: &str = "memory://sqs/";

/// A scripted rejection applied to the next batch call of its kind.
#[derive(Clone, Debug)]
pub struct Fault {
    /// Entry ids to reject; `None` rejects every entry
    pub ids: Option<Vec<String>>,
    pub sender_fault: bool,
    pub message: String,
}

impl Fault {
    pub fn all(message: impl Into<String>, sender_fault: bool) -> Self {
        Self {
            ids: None,
            sender_fault,
            message: message.into(),
        }
    }

    pub fn only<I, S>(ids: I, message: impl Into<String>, sender_fault: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            sender_fault,
            message: message.into(),
        }
    }

    fn rejects(&self, id: &str) -> bool {
        self.ids
            .as_ref()
            .map(|ids| ids.iter().any(|i| i == id))
            .unwrap_or(true)
    }
}

#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: Option<String>,
    message_attributes: HashMap<String, MessageAttribute>,
    receive_count: u32,
}

#[derive(Default)]
struct MemoryQueue {
    visible: VecDeque<StoredMessage>,
    /// In-flight messages keyed by their current receipt handle
    in_flight: HashMap<String, StoredMessage>,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, MemoryQueue>,
    next_id: u64,
    send_faults: VecDeque<Fault>,
    delete_faults: VecDeque<Fault>,
    delete_calls: Vec<Vec<DeleteEntry>>,
    created: Vec<String>,
    deleted: Vec<String>,
}

impl State {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn queue(&mut self, queue_url: &str, operation: &'static str) -> Result<&mut MemoryQueue> {
        self.queues
            .get_mut(queue_url)
            .ok_or_else(|| {
                Error::service(
                    operation,
                    queue_url,
                    "AWS.SimpleQueueService.NonExistentQueue",
                )
            })
    }
}

#[derive(Default)]
pub struct MemoryQueueService {
    state: Mutex<State>,
}

impl MemoryQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_for(name: &str) -> String {
        format!("{}{}", URL_PREFIX, name)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the queue contents from others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a queue outside of the [`QueueService`] bookkeeping.
    pub fn add_queue(&self, name: &str) -> String {
        let url = Self::url_for(name);
        self.lock().queues.entry(url.clone()).or_default();
        url
    }

    /// Enqueues a message and returns its id.
    pub fn push(&self, queue_url: &str, body: impl Into<String>) -> String {
        self.push_message(queue_url, Some(body.into()), HashMap::new())
    }

    pub fn push_message(
        &self,
        queue_url: &str,
        body: Option<String>,
        message_attributes: HashMap<String, MessageAttribute>,
    ) -> String {
        let mut state = self.lock();
        let message_id = format!("msg-{:06}", state.next());
        state.queues.entry(queue_url.to_string()).or_default().visible.push_back(StoredMessage {
            message_id: message_id.clone(),
            body,
            message_attributes,
            receive_count: 0,
        });
        message_id
    }

    /// Bodies of the messages that can currently be received, in queue order.
    pub fn visible_bodies(&self, queue_url: &str) -> Vec<Option<String>> {
        self.lock()
            .queues
            .get(queue_url)
            .map(|q| q.visible.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    pub fn visible_count(&self, queue_url: &str) -> usize {
        self.lock()
            .queues
            .get(queue_url)
            .map(|q| q.visible.len())
            .unwrap_or(0)
    }

    pub fn in_flight_count(&self, queue_url: &str) -> usize {
        self.lock()
            .queues
            .get(queue_url)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }

    /// Makes every in-flight message visible again, invalidating its receipt.
    pub fn expire_in_flight(&self, queue_url: &str) {
        if let Some(queue) = self.lock().queues.get_mut(queue_url) {
            let expired: Vec<_> = queue.in_flight.drain().map(|(_, m)| m).collect();
            queue.visible.extend(expired);
        }
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.lock().queues.contains_key(&Self::url_for(name))
    }

    /// Names of the queues created or deleted through [`QueueService`].
    pub fn created_queues(&self) -> Vec<String> {
        self.lock().created.clone()
    }

    pub fn deleted_queues(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Every delete batch request seen so far.
    pub fn delete_calls(&self) -> Vec<Vec<DeleteEntry>> {
        self.lock().delete_calls.clone()
    }

    pub fn fail_next_send(&self, fault: Fault) {
        self.lock().send_faults.push_back(fault);
    }

    pub fn fail_next_delete(&self, fault: Fault) {
        self.lock().delete_faults.push_back(fault);
    }
}

#[async_trait]
impl QueueService for MemoryQueueService {
    async fn receive_batch(
        &self,
        queue_url: &str,
        request: ReceiveRequest,
    ) -> Result<Vec<Message>> {
        let mut state = self.lock();
        let queue = state.queue(queue_url, "ReceiveMessage")?;
        let take = (request.max_number_of_messages.max(1) as usize).min(queue.visible.len());
        let batch: Vec<_> = queue.visible.drain(..take).collect();

        let mut messages = Vec::with_capacity(batch.len());
        for mut stored in batch {
            stored.receive_count += 1;
            let receipt_handle = format!("receipt-{}", state.next());

            let mut attributes = HashMap::new();
            attributes.insert(
                "ApproximateReceiveCount".to_string(),
                stored.receive_count.to_string(),
            );
            messages.push(Message {
                message_id: stored.message_id.clone(),
                receipt_handle: receipt_handle.clone(),
                body: stored.body.clone(),
                attributes,
                message_attributes: stored.message_attributes.clone(),
            });
            state
                .queue(queue_url, "ReceiveMessage")?
                .in_flight
                .insert(receipt_handle, stored);
        }

        Ok(messages)
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        entries: Vec<SendEntry>,
    ) -> Result<SendBatchOutput> {
        let mut state = self.lock();
        state.queue(queue_url, "SendMessageBatch")?;
        let fault = state.send_faults.pop_front();

        let mut output = SendBatchOutput::default();
        for entry in entries {
            if let Some(fault) = fault.as_ref().filter(|f| f.rejects(&entry.id)) {
                output.failed.push(BatchFailure::new(
                    entry.id,
                    fault.message.clone(),
                    fault.sender_fault,
                ));
                continue;
            }

            let message_id = format!("msg-{:06}", state.next());
            state.queue(queue_url, "SendMessageBatch")?.visible.push_back(StoredMessage {
                message_id,
                body: entry.body,
                message_attributes: entry.message_attributes,
                receive_count: 0,
            });
            output.successful.push(entry.id);
        }

        Ok(output)
    }

    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteEntry>,
    ) -> Result<Vec<BatchFailure>> {
        let mut state = self.lock();
        state.queue(queue_url, "DeleteMessageBatch")?;
        state.delete_calls.push(entries.clone());
        let fault = state.delete_faults.pop_front();

        let queue = state.queue(queue_url, "DeleteMessageBatch")?;
        let mut failed = Vec::new();
        for entry in entries {
            if let Some(fault) = fault.as_ref().filter(|f| f.rejects(&entry.id)) {
                failed.push(BatchFailure::new(
                    entry.id,
                    fault.message.clone(),
                    fault.sender_fault,
                ));
                continue;
            }

            if queue.in_flight.remove(&entry.receipt_handle).is_none() {
                failed.push(BatchFailure::new(
                    entry.id,
                    "The receipt handle provided is not valid.",
                    true,
                ));
            }
        }

        Ok(failed)
    }

    async fn create_queue(&self, name: &str) -> Result<String> {
        let url = Self::url_for(name);
        let mut state = self.lock();
        state.queues.entry(url.clone()).or_default();
        state.created.push(name.to_string());
        Ok(url)
    }

    async fn delete_queue(&self, queue_url: &str) -> Result<()> {
        let mut state = self.lock();
        if state.queues.remove(queue_url).is_none() {
            return Err(Error::service(
                "DeleteQueue",
                queue_url,
                "AWS.SimpleQueueService.NonExistentQueue",
            ));
        }
        let name = queue_url.trim_start_matches(URL_PREFIX).to_string();
        state.deleted.push(name);
        Ok(())
    }

    async fn resolve_queue_url(&self, name: &str) -> Result<String> {
        let url = Self::url_for(name);
        if self.lock().queues.contains_key(&url) {
            Ok(url)
        } else {
            Err(Error::QueueNotFound {
                name: name.to_string(),
                region: "memory".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ReceiveRequest {
        ReceiveRequest {
            max_number_of_messages: 10,
            wait_time_seconds: 0,
        }
    }

    #[tokio::test]
    async fn create_queue_is_idempotent() {
        let service = MemoryQueueService::new();

        let first = service.create_queue("orders").await.unwrap();
        service.push(&first, "kept");
        let second = service.create_queue("orders").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.visible_count(&second), 1);
    }

    #[tokio::test]
    async fn each_receive_issues_a_fresh_receipt() {
        let service = MemoryQueueService::new();
        let url = service.add_queue("orders");
        service.push(&url, "a");

        let first = service.receive_batch(&url, request()).await.unwrap();
        service.expire_in_flight(&url);
        let second = service.receive_batch(&url, request()).await.unwrap();

        assert_eq!(first[0].message_id, second[0].message_id);
        assert_ne!(first[0].receipt_handle, second[0].receipt_handle);
        assert_eq!(second[0].attributes["ApproximateReceiveCount"], "2");

        // the stale receipt is rejected as a sender fault
        let failed = service
            .delete_batch(&url, vec![DeleteEntry::from(&first[0])])
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].sender_fault);

        let failed = service
            .delete_batch(&url, vec![DeleteEntry::from(&second[0])])
            .await
            .unwrap();
        assert!(failed.is_empty());
        assert_eq!(service.in_flight_count(&url), 0);
    }

    #[tokio::test]
    async fn resolve_unknown_queue_is_not_found() {
        let service = MemoryQueueService::new();
        let err = service.resolve_queue_url("missing").await.unwrap_err();
        assert!(matches!(err, Error::QueueNotFound { .. }));
    }

    #[tokio::test]
    async fn scripted_send_fault_rejects_selected_entries() {
        let service = MemoryQueueService::new();
        let url = service.add_queue("dest");
        service.fail_next_send(Fault::only(["b"], "throttled", false));

        let entries = ["a", "b"]
            .into_iter()
            .map(|id| SendEntry {
                id: id.to_string(),
                body: Some(id.to_string()),
                message_attributes: HashMap::new(),
            })
            .collect();
        let output = service.send_batch(&url, entries).await.unwrap();

        assert_eq!(output.successful, vec!["a".to_string()]);
        assert_eq!(output.failed, vec![BatchFailure::new("b", "throttled", false)]);
        assert_eq!(service.visible_bodies(&url), vec![Some("a".to_string())]);
    }
}
