//! Per-job status events.
//!
//! A [`ProgressEmitter`] follows one admitted job from its queue position to
//! its last produced file, and pushes the resulting items into a bounded
//! channel for the multipart encoder to frame.

mod emitter;
mod events;

pub use emitter::ProgressEmitter;
pub use events::{progress_percent, StatusEvent};
