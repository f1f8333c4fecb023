use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawns a task reading `reader` line by line into a bounded channel.
///
/// Lines are sent without their trailing newline. A full channel blocks the
/// reader until the consumer catches up, and dropping the receiver stops the
/// task early without an error.
///
/// # Errors
/// An I/O error ends the task; it is returned through the `JoinHandle` after
/// every line read before it has been sent.
pub fn concurrent_lines<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
    channel_capacity: usize,
) -> (JoinHandle<std::io::Result<()>>, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel::<String>(channel_capacity);
    let buffer = BufReader::new(reader);

    let task = tokio::spawn(async move {
        let mut lines = buffer.lines();
        while let Some(line) = lines.next_line().await? {
            if tx.send(line).await.is_err() {
                log::debug!("line receiver dropped, stopping reader");
                break;
            }
        }
        log::trace!("reached EOF, exiting reader task");
        Ok(())
    });

    (task, rx)
}
