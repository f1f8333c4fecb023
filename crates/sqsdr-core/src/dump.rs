use crate::chooser::RightPassthroughChooser;
use crate::client::QueueService;
use crate::error::Result;
use crate::fallthrough::FallthroughPipeline;
use crate::poller::PollerConfig;
use crate::redrive::QueueRef;
use crate::sink::{DiscardSink, QueueSink, Sinker, WriterSink};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Writes every message of a queue to `out`, one JSON object per line, and
/// leaves the queue's contents in place.
///
/// Each message is written on its way into a fallthrough queue and is put
/// back into the source from there.
pub struct Dump<W> {
    pub source: QueueRef,
    pub out: Arc<Mutex<W>>,
    pub config: PollerConfig,
}

impl<W: Write + Send + 'static> Dump<W> {
    pub fn new(source: QueueRef, out: W) -> Self {
        Self::shared(source, Arc::new(Mutex::new(out)))
    }

    pub fn shared(source: QueueRef, out: Arc<Mutex<W>>) -> Self {
        Self {
            source,
            out,
            config: PollerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn dump(&self, cancel: &CancellationToken) -> Result<()> {
        log::info!("dumping {}", self.source.url);

        let out = self.out.clone();
        let right_sink = Box::new(move |queue_url: &str, service: Arc<dyn QueueService>| {
            let passthrough: Arc<dyn Sinker> = Arc::new(QueueSink::new(queue_url, service));
            Arc::new(WriterSink::shared(out.clone(), passthrough)) as Arc<dyn Sinker>
        });

        FallthroughPipeline::new(
            Arc::new(RightPassthroughChooser),
            Arc::new(DiscardSink),
            self.source.service.clone(),
            &self.source.url,
        )
        .with_right_sink(right_sink)
        .with_config(self.config)
        .run(cancel)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueueService;

    #[tokio::test]
    async fn dump_keeps_messages_in_the_source() {
        let service = Arc::new(MemoryQueueService::new());
        let url = service.add_queue("dlq");
        service.push(&url, "one");
        service.push(&url, "two");

        let out = Arc::new(Mutex::new(Vec::<u8>::new()));
        Dump::shared(QueueRef::new(&url, service.clone()), out.clone())
            .with_config(PollerConfig {
                wait_time_seconds: 0,
                ..PollerConfig::default()
            })
            .dump(&CancellationToken::new())
            .await
            .unwrap();

        let text = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(service.visible_count(&url), 2);
        assert!(!service.queue_exists("sqsdr-dlq-fallthrough"));
    }
}
