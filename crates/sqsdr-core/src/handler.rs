use crate::error::Error;
use crate::message::Message;
use async_trait::async_trait;

/// The outcome of handling one batch.
#[derive(Debug, Default)]
pub struct Handled {
    /// Messages that were durably handled and may be deleted from their source
    pub processed: Vec<Message>,
    /// Why the remaining messages, if any, were not handled
    pub error: Option<Error>,
}

impl Handled {
    pub fn all(processed: Vec<Message>) -> Self {
        Self {
            processed,
            error: None,
        }
    }
}

/// Anything that can process a batch of received messages.
///
/// Messages reported as processed are removed from the source queue by the
/// [`Poller`](crate::Poller); a handler need not worry about their lifecycle.
/// Messages left out stay in the queue and are redelivered once their
/// visibility timeout lapses.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, messages: Vec<Message>) -> Handled;
}
