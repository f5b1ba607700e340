//! Error types for the queue module.

use thiserror::Error;

use super::types::JobId;

/// Errors returned by queue admission and ticket operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue already holds `capacity` jobs.
    #[error("Queue is full (capacity {capacity})")]
    Rejected { capacity: usize },

    /// A job with the same id is already held by the queue.
    #[error("Job already admitted: {0}")]
    AlreadyAdmitted(JobId),

    /// The queue no longer accepts work.
    #[error("Queue is shut down")]
    ShutDown,

    /// The job was cancelled before it could run.
    #[error("Job was cancelled")]
    Cancelled,
}
