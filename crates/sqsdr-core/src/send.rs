use crate::client::{QueueService, SendEntry, MAX_BATCH_SIZE};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Sends raw message bodies to a queue, up to ten per request.
///
/// Empty bodies are skipped since SQS rejects them. Returns how many messages
/// were sent; any rejected entry fails the call after the batches before it
/// have been sent.
pub async fn send_bodies(
    service: &dyn QueueService,
    queue_url: &str,
    bodies: &[impl AsRef<str>],
) -> Result<usize> {
    let bodies: Vec<&str> = bodies
        .iter()
        .map(AsRef::as_ref)
        .filter(|body| !body.is_empty())
        .collect();

    let mut sent = 0;
    for (n, chunk) in bodies.chunks(MAX_BATCH_SIZE).enumerate() {
        // ids only have to be unique within one request
        let entries = chunk
            .iter()
            .enumerate()
            .map(|(i, body)| SendEntry {
                id: format!("msg_{}", n * MAX_BATCH_SIZE + i),
                body: Some(body.to_string()),
                message_attributes: HashMap::new(),
            })
            .collect();

        let output = service.send_batch(queue_url, entries).await?;
        if !output.failed.is_empty() {
            return Err(Error::batch(
                format!("failed to batch send messages to {}", queue_url),
                output.failed,
            ));
        }

        for id in &output.successful {
            log::debug!("sent {} to {}", id, queue_url);
        }
        sent += output.successful.len();
    }

    Ok(sent)
}
