//! Error types for the processor module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while processing a job.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// The external process failed.
    #[error("Processing failed: {reason}")]
    ProcessFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Reading the input failed.
    #[error("Failed to read input: {reason}")]
    InputFailed { reason: String },

    /// I/O error during processing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job was cancelled.
    #[error("Processing cancelled")]
    Cancelled,
}

impl ProcessorError {
    /// Creates a new process failed error with stderr output.
    pub fn process_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ProcessFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Whether this error only reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
