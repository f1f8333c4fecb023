use crate::chooser::Chooser;
use crate::error::{Error, Side};
use crate::handler::{Handled, Handler};
use crate::message::Message;
use crate::sink::Sinker;
use async_trait::async_trait;
use std::sync::Arc;

/// Wires a chooser to a left and a right sink.
///
/// Only the messages of a side whose sink succeeded are reported as
/// processed, so a failed delivery leaves its messages in the source queue.
#[derive(Clone)]
pub struct Pipeline {
    pub chooser: Arc<dyn Chooser>,
    pub left_sink: Arc<dyn Sinker>,
    pub right_sink: Arc<dyn Sinker>,
}

impl Pipeline {
    pub fn new(
        chooser: Arc<dyn Chooser>,
        left_sink: Arc<dyn Sinker>,
        right_sink: Arc<dyn Sinker>,
    ) -> Self {
        Self {
            chooser,
            left_sink,
            right_sink,
        }
    }

    async fn deliver(sink: &dyn Sinker, side: Side, messages: Vec<Message>) -> Handled {
        if messages.is_empty() {
            return Handled::default();
        }

        match sink.sink(&messages).await {
            Ok(()) => Handled::all(messages),
            Err(e) => {
                log::error!("{} failed for {} messages: {}", side, messages.len(), e);
                Handled {
                    processed: Vec::new(),
                    error: Some(Error::SinkFailed {
                        side,
                        source: Box::new(e),
                    }),
                }
            }
        }
    }
}

#[async_trait]
impl Handler for Pipeline {
    async fn handle(&self, messages: Vec<Message>) -> Handled {
        let (left, right) = self.chooser.choose(messages);
        log::debug!("chose {} left and {} right", left.len(), right.len());

        let left = Self::deliver(self.left_sink.as_ref(), Side::Left, left).await;
        let right = Self::deliver(self.right_sink.as_ref(), Side::Right, right).await;

        let error = match (left.error, right.error) {
            (Some(left), Some(right)) => Some(Error::PipelineFailed {
                left: Box::new(left),
                right: Box::new(right),
            }),
            (Some(e), None) | (None, Some(e)) => Some(e),
            (None, None) => None,
        };

        let mut processed = left.processed;
        processed.extend(right.processed);

        Handled { processed, error }
    }
}
