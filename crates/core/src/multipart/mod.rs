//! `multipart/mixed` response framing.
//!
//! The encoder turns an ordered sequence of [`StreamItem`]s into one chunked
//! byte stream. Status events become JSON parts, files become attachment
//! parts streamed chunk by chunk, and a plain-text `keepalive` part is
//! written whenever the stream has been idle for the configured interval.
//!
//! Wire layout for a stream with two parts:
//!
//! ```text
//! --B\r\n
//! Content-Type: application/json\r\n
//! \r\n
//! {"position":0}\r\n
//! --B\r\n
//! Content-Disposition: attachment; filename="file1.mp3"\r\n
//! Content-Type: audio/mpeg\r\n
//! \r\n
//! <bytes>\r\n
//! --B--\r\n
//! ```

mod encoder;
mod writer;

use std::fmt;
use thiserror::Error;

use crate::processor::ProcessedFile;
use crate::progress::StatusEvent;

pub use encoder::{receiver_stream, MultipartEncoder};
pub use writer::{content_type, generate_boundary, MultipartWriter, KEEPALIVE};

/// One unit of a response stream.
pub enum StreamItem {
    Event(StatusEvent),
    File(ProcessedFile),
}

impl fmt::Debug for StreamItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(event) => f.debug_tuple("Event").field(event).finish(),
            Self::File(file) => f.debug_tuple("File").field(&file.name()).finish(),
        }
    }
}

impl From<StatusEvent> for StreamItem {
    fn from(event: StatusEvent) -> Self {
        Self::Event(event)
    }
}

impl From<ProcessedFile> for StreamItem {
    fn from(file: ProcessedFile) -> Self {
        Self::File(file)
    }
}

/// Why a response stream ended early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The connection went away or the job was cancelled. Nothing is written.
    #[error("stream aborted")]
    Aborted,
    /// Production failed; the message is written as a final error part.
    #[error("{0}")]
    Failed(String),
}

impl StreamError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Message to surface to the client, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Aborted => None,
            Self::Failed(message) if message.is_empty() => None,
            Self::Failed(message) => Some(message),
        }
    }
}

pub type StreamResult = Result<StreamItem, StreamError>;
