//! Destinations for a batch of messages.

use crate::client::{QueueService, SendEntry};
use crate::error::{Error, Result};
use crate::message::Message;
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Puts a batch of messages somewhere: another queue, a file, or nowhere.
///
/// Either the whole batch is delivered and `Ok(())` is returned, or an error
/// is returned and none of the messages may be treated as delivered.
#[async_trait]
pub trait Sinker: Send + Sync {
    async fn sink(&self, messages: &[Message]) -> Result<()>;
}

/// Drops messages on the floor.
///
/// Use it only to signal that the other side of a pipeline does all of the
/// work.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

#[async_trait]
impl Sinker for DiscardSink {
    async fn sink(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }
}

/// Forwards messages to a queue with a single batch send.
#[derive(Clone)]
pub struct QueueSink {
    pub queue_url: String,
    pub service: Arc<dyn QueueService>,
}

impl QueueSink {
    pub fn new(queue_url: impl Into<String>, service: Arc<dyn QueueService>) -> Self {
        Self {
            queue_url: queue_url.into(),
            service,
        }
    }
}

#[async_trait]
impl Sinker for QueueSink {
    async fn sink(&self, messages: &[Message]) -> Result<()> {
        let entries = messages.iter().map(SendEntry::from).collect();

        let output = self.service.send_batch(&self.queue_url, entries).await?;

        // a partially accepted batch cannot be told apart from a lost one by
        // the caller, so any failure voids the whole batch
        if !output.failed.is_empty() {
            return Err(Error::batch(
                format!("failed to batch send messages to {}", self.queue_url),
                output.failed,
            ));
        }

        log::debug!(
            "sent {} messages to {}",
            output.successful.len(),
            self.queue_url
        );
        Ok(())
    }
}

/// Writes every message as one JSON line, then hands the batch to another
/// sink.
///
/// The inner sink only sees the batch once every record has been written, so
/// a message is never delivered onwards without its copy on disk.
pub struct WriterSink<W> {
    writer: Arc<Mutex<W>>,
    passthrough: Arc<dyn Sinker>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, passthrough: Arc<dyn Sinker>) -> Self {
        Self::shared(Arc::new(Mutex::new(writer)), passthrough)
    }

    /// A sink writing to a writer the caller keeps a handle on.
    pub fn shared(writer: Arc<Mutex<W>>, passthrough: Arc<dyn Sinker>) -> Self {
        Self {
            writer,
            passthrough,
        }
    }

    fn write_records(&self, messages: &[Message]) -> Vec<String> {
        let mut errors = Vec::new();
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for message in messages {
            let written = serde_json::to_vec(&message.to_record())
                .map_err(|e| e.to_string())
                .and_then(|mut line| {
                    line.push(b'\n');
                    writer.write_all(&line).map_err(|e| e.to_string())
                });

            if let Err(e) = written {
                log::error!(
                    "an error occurred while dumping message {} to JSON: {}",
                    message.message_id,
                    e
                );
                errors.push(format!("{}: {}", message.message_id, e));
            }
        }

        if let Err(e) = writer.flush() {
            errors.push(format!("flush: {}", e));
        }

        errors
    }
}

#[async_trait]
impl<W: Write + Send> Sinker for WriterSink<W> {
    async fn sink(&self, messages: &[Message]) -> Result<()> {
        let errors = self.write_records(messages);
        if !errors.is_empty() {
            return Err(Error::Serialization(errors));
        }

        self.passthrough.sink(messages).await
    }
}
