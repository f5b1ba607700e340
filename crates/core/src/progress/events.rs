use serde::{Deserialize, Serialize};

/// Notification sent to the client as a JSON part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusEvent {
    /// Number of jobs that will start before this one.
    QueuePosition { position: usize },
    /// Overall progress in percent, at output granularity.
    Progress { progress: u8 },
    /// Terminal failure of the job.
    ProcessingError { error: String },
}

impl StatusEvent {
    pub fn position(position: usize) -> Self {
        Self::QueuePosition { position }
    }

    pub fn progress(progress: u8) -> Self {
        Self::Progress { progress }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            error: message.into(),
        }
    }
}

/// Percentage after `done` of `total` outputs, rounded half up.
pub fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total);
    ((done * 100 + total / 2) / total) as u8
}
