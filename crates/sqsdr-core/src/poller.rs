//! The receive → handle → delete loop over one source queue.

use crate::client::{
    DeleteEntry, QueueService, ReceiveRequest, MAX_BATCH_SIZE, MAX_WAIT_TIME_SECONDS,
};
use crate::error::{BatchFailure, Error, Result};
use crate::handler::{Handled, Handler};
use crate::message::Message;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Knobs for a [`Poller`] run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    /// Consecutive empty receives after which the queue is considered drained
    pub max_empty_receives: usize,
    pub wait_time_seconds: i32,
    pub max_number_of_messages: i32,
    /// Extra delete attempts for entries that failed without a sender fault
    pub max_delete_retries: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_empty_receives: 2,
            wait_time_seconds: 5,
            max_number_of_messages: MAX_BATCH_SIZE as i32,
            max_delete_retries: 2,
        }
    }
}

impl PollerConfig {
    fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_number_of_messages: self.max_number_of_messages.clamp(1, MAX_BATCH_SIZE as i32),
            wait_time_seconds: self.wait_time_seconds.clamp(0, MAX_WAIT_TIME_SECONDS),
        }
    }
}

/// Races a remote call against cancellation.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = call => Ok(out),
    }
}

/// Polls a queue, hands each batch to a [`Handler`], and deletes the messages
/// the handler reports as processed.
///
/// A message is only ever deleted after its handler confirmed it, so a crash
/// anywhere in the loop leads to redelivery rather than loss. For more
/// throughput run several pollers against the same queue; the queue's own
/// visibility timeout keeps them from handling the same delivery twice.
pub struct Poller<H> {
    pub queue_url: String,
    pub service: Arc<dyn QueueService>,
    pub handler: H,
    pub config: PollerConfig,
}

impl<H: Handler> Poller<H> {
    /// A poller that long-polls and receives at most 10 messages at a time.
    pub fn new(queue_url: impl Into<String>, service: Arc<dyn QueueService>, handler: H) -> Self {
        Self {
            queue_url: queue_url.into(),
            service,
            handler,
            config: PollerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs until the queue looks drained, an error occurs, or `cancel` fires.
    ///
    /// Messages that were received but not yet deleted when the run stops are
    /// left to be redelivered.
    pub async fn process(&self, cancel: &CancellationToken) -> Result<()> {
        let mut empty_receives = 0;
        loop {
            let received = self.process_once(cancel).await?;

            if received == 0 {
                empty_receives += 1;
                log::info!(
                    "received empty response {} of {} from {}",
                    empty_receives,
                    self.config.max_empty_receives,
                    self.queue_url
                );
            } else {
                empty_receives = 0;
            }

            if empty_receives >= self.config.max_empty_receives {
                return Ok(());
            }
        }
    }

    /// Receives, handles, and deletes one batch, returning how many messages
    /// were received.
    ///
    /// Handy where the runtime is limited and the caller drives the loop.
    pub async fn process_once(&self, cancel: &CancellationToken) -> Result<usize> {
        let messages = cancellable(
            cancel,
            self.service
                .receive_batch(&self.queue_url, self.config.receive_request()),
        )
        .await??;

        if messages.is_empty() {
            return Ok(0);
        }

        let received = messages.len();
        log::debug!("received {} messages from {}", received, self.queue_url);

        let Handled { processed, error } =
            cancellable(cancel, self.handler.handle(messages)).await?;

        if let Some(e) = &error {
            log::error!(
                "{} of {} messages from {} were not handled: {}",
                received - processed.len(),
                received,
                self.queue_url,
                e
            );
        }

        if !processed.is_empty() {
            if let Err(delete) = self.delete_messages(&processed, cancel).await {
                return Err(match error {
                    Some(handler) => Error::Unfinished {
                        handler: Box::new(handler),
                        delete: Box::new(delete),
                    },
                    None => delete,
                });
            }
            log::debug!("deleted {} messages from {}", processed.len(), self.queue_url);
        }

        if let Some(e) = error {
            return Err(e);
        }

        Ok(received)
    }

    async fn delete_messages(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let entries: Vec<DeleteEntry> = messages.iter().map(DeleteEntry::from).collect();

        let failed = self.delete_entries(entries.clone(), cancel).await?;

        if failed.is_empty() {
            return Ok(());
        }

        if sender_fault(&failed) {
            return Err(Error::batch("failed to batch delete messages", failed));
        }

        self.delete_failed_entries(&entries, failed, cancel).await
    }

    async fn delete_entries(
        &self,
        entries: Vec<DeleteEntry>,
        cancel: &CancellationToken,
    ) -> Result<Vec<BatchFailure>> {
        cancellable(cancel, self.service.delete_batch(&self.queue_url, entries)).await?
    }

    /// Retries entries that failed for reasons other than a sender fault,
    /// assumed to be availability problems on the queue's side.
    async fn delete_failed_entries(
        &self,
        entries: &[DeleteEntry],
        mut failed: Vec<BatchFailure>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // failures only carry the entry id; the receipt handle has to be
        // recovered from the original request
        let receipts: HashMap<&str, &str> = entries
            .iter()
            .map(|e| (e.id.as_str(), e.receipt_handle.as_str()))
            .collect();

        let max_retries = self.config.max_delete_retries;
        for attempt in 1..=max_retries {
            log::warn!(
                "retrying delete of {} messages from {} ({} of {})",
                failed.len(),
                self.queue_url,
                attempt,
                max_retries
            );

            let retry = failed
                .iter()
                .filter_map(|f| {
                    receipts.get(f.id.as_str()).map(|receipt_handle| DeleteEntry {
                        id: f.id.clone(),
                        receipt_handle: receipt_handle.to_string(),
                    })
                })
                .collect();

            failed = self.delete_entries(retry, cancel).await?;

            if failed.is_empty() {
                return Ok(());
            }

            if sender_fault(&failed) {
                return Err(Error::batch("failed to batch delete messages", failed));
            }
        }

        Err(Error::batch(
            format!("unable to delete messages with {} retries", max_retries),
            failed,
        ))
    }
}

/// If any entry is a sender fault the whole batch is assumed to be broken.
fn sender_fault(failed: &[BatchFailure]) -> bool {
    failed.iter().any(|f| f.sender_fault)
}
