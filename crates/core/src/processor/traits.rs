//! Trait definitions for the processor module.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::error::ProcessorError;
use super::types::{MediaInput, OutputOptions, ProcessedFile};

/// Ordered outputs of one processing run.
pub type ProcessedStream = BoxStream<'static, Result<ProcessedFile, ProcessorError>>;

/// A component that turns one input into one file per requested output.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Returns the name of this processor implementation.
    fn name(&self) -> &str;

    /// Starts processing and returns the produced files in `outputs` order.
    ///
    /// Implementations must stop promptly once `cancel` fires and discard any
    /// partial output. Nothing runs until the stream is polled or, for
    /// implementations driven by a background task, until this is called.
    fn process(
        &self,
        input: MediaInput,
        outputs: Vec<OutputOptions>,
        cancel: CancellationToken,
    ) -> ProcessedStream;

    /// Validates that the processor is properly configured and ready.
    async fn validate(&self) -> Result<(), ProcessorError>;
}
