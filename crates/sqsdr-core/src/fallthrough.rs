//! Non-destructive filtering over a queue that has no conditional peek.

use crate::chooser::{Chooser, PassthroughChooser};
use crate::client::QueueService;
use crate::error::{Error, Phase, Result};
use crate::pipeline::Pipeline;
use crate::poller::{cancellable, Poller, PollerConfig};
use crate::sink::{DiscardSink, QueueSink, Sinker};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds the right-hand sink once the fallthrough queue exists.
pub type RightSinkFactory =
    Box<dyn Fn(&str, Arc<dyn QueueService>) -> Arc<dyn Sinker> + Send + Sync>;

/// Name of the temporary queue used for messages of `queue_url` that fall
/// through a filter.
///
/// The name only depends on the source queue, so a run that crashed half way
/// picks its queue up again instead of creating another one.
pub fn fallthrough_queue_name(queue_url: &str) -> String {
    let name = queue_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(queue_url);
    format!("sqsdr-{}-fallthrough", name)
}

/// Runs a chooser over a whole queue without losing the messages it rejects.
///
/// 1. creates (or reuses) the fallthrough queue
/// 2. polls the source: left goes to `left_sink`, right goes to the sink built
///    by `right_sink`, normally a [`QueueSink`] on the fallthrough queue
/// 3. polls the fallthrough queue and sends everything back to the source
/// 4. deletes the fallthrough queue
///
/// A failure in any step stops the run without deleting the fallthrough queue,
/// which keeps whatever it already holds. Running again drains it.
pub struct FallthroughPipeline {
    pub chooser: Arc<dyn Chooser>,
    pub left_sink: Arc<dyn Sinker>,
    pub right_sink: RightSinkFactory,
    pub service: Arc<dyn QueueService>,
    pub source_queue_url: String,
    pub config: PollerConfig,
}

impl FallthroughPipeline {
    /// A pipeline whose rejected messages are parked in the fallthrough queue
    /// unchanged.
    pub fn new(
        chooser: Arc<dyn Chooser>,
        left_sink: Arc<dyn Sinker>,
        service: Arc<dyn QueueService>,
        source_queue_url: impl Into<String>,
    ) -> Self {
        Self {
            chooser,
            left_sink,
            right_sink: Box::new(|queue_url: &str, service: Arc<dyn QueueService>| {
                Arc::new(QueueSink::new(queue_url, service)) as Arc<dyn Sinker>
            }),
            service,
            source_queue_url: source_queue_url.into(),
            config: PollerConfig::default(),
        }
    }

    pub fn with_right_sink(mut self, right_sink: RightSinkFactory) -> Self {
        self.right_sink = right_sink;
        self
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let name = fallthrough_queue_name(&self.source_queue_url);
        log::info!("creating temporary fallthrough queue {}", name);
        let fallthrough_url = cancellable(cancel, self.service.create_queue(&name))
            .await
            .and_then(|created| created)
            .map_err(|e| Error::Fallthrough {
                phase: Phase::CreateQueue,
                queue: name.clone(),
                source: Box::new(e),
            })?;

        let forward = Pipeline::new(
            self.chooser.clone(),
            self.left_sink.clone(),
            (self.right_sink)(fallthrough_url.as_str(), self.service.clone()),
        );
        log::info!("passing messages from source queue through filter");
        Poller::new(&self.source_queue_url, self.service.clone(), forward)
            .with_config(self.config)
            .process(cancel)
            .await
            .map_err(|e| Error::Fallthrough {
                phase: Phase::Filter,
                queue: self.source_queue_url.clone(),
                source: Box::new(e),
            })?;

        let reverse = Pipeline::new(
            Arc::new(PassthroughChooser),
            Arc::new(QueueSink::new(&self.source_queue_url, self.service.clone())),
            Arc::new(DiscardSink),
        );
        log::info!("redriving messages from the fallthrough queue back to the source");
        Poller::new(&fallthrough_url, self.service.clone(), reverse)
            .with_config(self.config)
            .process(cancel)
            .await
            .map_err(|e| Error::Fallthrough {
                phase: Phase::Return,
                queue: fallthrough_url.clone(),
                source: Box::new(e),
            })?;

        log::info!("removing temporary fallthrough queue {}", fallthrough_url);
        cancellable(cancel, self.service.delete_queue(&fallthrough_url))
            .await
            .and_then(|deleted| deleted)
            .map_err(|e| Error::Fallthrough {
                phase: Phase::DeleteQueue,
                queue: fallthrough_url.clone(),
                source: Box::new(e),
            })
    }
}
