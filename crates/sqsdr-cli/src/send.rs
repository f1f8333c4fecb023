use crate::reader::concurrent_lines;
use anyhow::Context;
use sqsdr::{send_bodies, QueueService, MAX_BATCH_SIZE};
use tokio::io::AsyncRead;

/// Sends every non-empty line of `input` to a queue as its own message.
///
/// Lines are sent in batches as they are read, so a large file never has to
/// fit in memory. Returns the number of messages sent.
pub async fn send_lines<R: AsyncRead + Unpin + Send + 'static>(
    service: &dyn QueueService,
    queue_url: &str,
    input: R,
) -> anyhow::Result<usize> {
    let (reader, mut lines) = concurrent_lines(input, 100);

    let mut sent = 0;
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    while let Some(line) = lines.recv().await {
        if line.is_empty() {
            continue;
        }

        batch.push(line);
        if batch.len() == MAX_BATCH_SIZE {
            sent += send_bodies(service, queue_url, &batch)
                .await
                .with_context(|| format!("sent {} messages before failing", sent))?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        sent += send_bodies(service, queue_url, &batch)
            .await
            .with_context(|| format!("sent {} messages before failing", sent))?;
    }

    reader
        .await
        .context("line reader panicked")?
        .context("failed to read input")?;

    Ok(sent)
}
