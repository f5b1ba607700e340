//! Types for the queue module.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::processor::OutputOptions;

/// Opaque job identifier, unique per submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Snapshot published to a ticket's subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Number of queued jobs ahead of this one. Always 0 once the job left the FIFO.
    pub position: usize,
}

impl JobStatus {
    pub(crate) fn queued(position: usize) -> Self {
        Self {
            state: JobState::Queued,
            position,
        }
    }

    pub(crate) fn with_state(state: JobState) -> Self {
        Self { state, position: 0 }
    }
}

/// How a running job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl JobOutcome {
    pub(crate) fn state(&self) -> JobState {
        match self {
            Self::Completed => JobState::Completed,
            Self::Failed(_) => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }

    /// Failure message, if the job failed.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// A unit of admitted work.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    outputs: Vec<OutputOptions>,
    cancel: CancellationToken,
}

impl Job {
    /// Creates a job with a fresh id and its own cancellation token.
    pub fn new(outputs: Vec<OutputOptions>) -> Self {
        Self::with_id(JobId::new(), outputs)
    }

    pub fn with_id(id: JobId, outputs: Vec<OutputOptions>) -> Self {
        Self {
            id,
            outputs,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses a caller-owned cancellation token, e.g. a child of a connection token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn outputs(&self) -> &[OutputOptions] {
        &self.outputs
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Point-in-time statistics of a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub capacity: usize,
    pub parallelism: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
}
