use crate::chooser::{FilterChooser, PassthroughChooser};
use crate::client::QueueService;
use crate::error::Result;
use crate::fallthrough::FallthroughPipeline;
use crate::pipeline::Pipeline;
use crate::poller::{Poller, PollerConfig};
use crate::sink::{DiscardSink, QueueSink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A resolved queue and the service that owns it.
#[derive(Clone)]
pub struct QueueRef {
    pub url: String,
    pub service: Arc<dyn QueueService>,
}

impl QueueRef {
    pub fn new(url: impl Into<String>, service: Arc<dyn QueueService>) -> Self {
        Self {
            url: url.into(),
            service,
        }
    }

    /// Resolves a queue name once, up front, so a missing queue fails the
    /// command before any message is touched.
    pub async fn resolve(name: &str, service: Arc<dyn QueueService>) -> Result<Self> {
        let url = service.resolve_queue_url(name).await?;
        Ok(Self { url, service })
    }
}

/// Moves messages from a source queue to a destination queue.
///
/// Without a filter every message is moved. With one, only matching messages
/// are moved and the rest are returned to the source through a fallthrough
/// queue.
pub struct Redrive {
    pub source: QueueRef,
    pub destination: QueueRef,
    pub filter: Option<FilterChooser>,
    pub config: PollerConfig,
}

impl Redrive {
    pub fn new(source: QueueRef, destination: QueueRef) -> Self {
        Self {
            source,
            destination,
            filter: None,
            config: PollerConfig::default(),
        }
    }

    pub fn with_filter(mut self, filter: FilterChooser) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn redrive(&self, cancel: &CancellationToken) -> Result<()> {
        match &self.filter {
            Some(filter) => self.filtered_redrive(filter.clone(), cancel).await,
            None => self.simple_redrive(cancel).await,
        }
    }

    fn destination_sink(&self) -> Arc<QueueSink> {
        Arc::new(QueueSink::new(
            &self.destination.url,
            self.destination.service.clone(),
        ))
    }

    async fn simple_redrive(&self, cancel: &CancellationToken) -> Result<()> {
        log::info!("redriving {} to {}", self.source.url, self.destination.url);
        let pipeline = Pipeline::new(
            Arc::new(PassthroughChooser),
            self.destination_sink(),
            Arc::new(DiscardSink),
        );

        Poller::new(&self.source.url, self.source.service.clone(), pipeline)
            .with_config(self.config)
            .process(cancel)
            .await
    }

    async fn filtered_redrive(
        &self,
        filter: FilterChooser,
        cancel: &CancellationToken,
    ) -> Result<()> {
        log::info!(
            "redriving {} to {} through filter {}",
            self.source.url,
            self.destination.url,
            filter.regex()
        );

        FallthroughPipeline::new(
            Arc::new(filter),
            self.destination_sink(),
            self.source.service.clone(),
            &self.source.url,
        )
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
    async fn resolve_fails_for_unknown_queue() {
        let service: Arc<dyn QueueService> = Arc::new(MemoryQueueService::new());
        let err = QueueRef::resolve("nope", service).await.err().unwrap();
        assert_eq!(err.to_string(), "could not find queue with name 'nope' in memory");
    }

    #[tokio::test]
    async fn source_and_destination_may_use_different_services() {
        let east = Arc::new(MemoryQueueService::new());
        let west = Arc::new(MemoryQueueService::new());
        let source = east.add_queue("orders");
        let dest = west.add_queue("orders");
        east.push(&source, "a");
        east.push(&source, "b");

        Redrive::new(
            QueueRef::new(&source, east.clone()),
            QueueRef::new(&dest, west.clone()),
        )
        .with_config(PollerConfig {
            wait_time_seconds: 0,
            ..PollerConfig::default()
        })
        .redrive(&CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(east.visible_count(&source) + east.in_flight_count(&source), 0);
        assert_eq!(west.visible_count(&dest), 2);
    }
}
