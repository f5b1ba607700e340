use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use mediaflow_core::{Config, EncoderCapabilities, JobQueue, MediaKind, Processor};

/// Shared application state
pub struct AppState {
    config: Config,
    image_queue: JobQueue,
    audio_queue: JobQueue,
    video_queue: JobQueue,
    processor: Arc<dyn Processor>,
    capabilities: OnceCell<EncoderCapabilities>,
}

impl AppState {
    /// Creates one queue per media kind from `config.queues`.
    pub fn new(config: Config, processor: Arc<dyn Processor>) -> Self {
        let queue = |kind: MediaKind| JobQueue::create(kind.as_str(), config.queues.for_kind(kind));

        Self {
            image_queue: queue(MediaKind::Image),
            audio_queue: queue(MediaKind::Audio),
            video_queue: queue(MediaKind::Video),
            config,
            processor,
            capabilities: OnceCell::new(),
        }
    }

    /// Uses `capabilities` instead of probing ffmpeg on first use.
    pub fn with_capabilities(mut self, capabilities: EncoderCapabilities) -> Self {
        self.capabilities = OnceCell::new_with(Some(capabilities));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self, kind: MediaKind) -> &JobQueue {
        match kind {
            MediaKind::Image => &self.image_queue,
            MediaKind::Audio => &self.audio_queue,
            MediaKind::Video => &self.video_queue,
        }
    }

    /// Queues in `MediaKind::ALL` order.
    pub fn queues(&self) -> impl Iterator<Item = (MediaKind, &JobQueue)> {
        MediaKind::ALL.into_iter().map(|kind| (kind, self.queue(kind)))
    }

    pub fn processor(&self) -> Arc<dyn Processor> {
        Arc::clone(&self.processor)
    }

    /// Detected ffmpeg capabilities, probed once.
    pub async fn capabilities(&self) -> &EncoderCapabilities {
        self.capabilities
            .get_or_init(|| async {
                let capabilities = EncoderCapabilities::detect(&self.config.processor).await;
                info!(
                    "Detected {} encoders, {} filters, {} formats",
                    capabilities.encoders.len(),
                    capabilities.filters.len(),
                    capabilities.formats.len()
                );
                capabilities
            })
            .await
    }

    /// Stops admitting jobs and cancels everything in flight.
    pub fn shutdown(&self) {
        for (_, queue) in self.queues() {
            queue.shutdown();
        }
    }
}
