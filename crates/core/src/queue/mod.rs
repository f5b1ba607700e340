//! Bounded-capacity, bounded-parallelism job admission.
//!
//! A [`JobQueue`] accepts or rejects work synchronously. Admitted jobs are
//! `Queued` and get promoted to `Running` in strict FIFO order whenever a
//! running slot is free. Each admission returns a [`Ticket`] that exposes the
//! job's live status through a `watch` channel, and settles the job when it
//! is completed, failed, or dropped.
//!
//! # Example
//!
//! ```ignore
//! use mediaflow_core::queue::{Job, JobQueue};
//! use mediaflow_core::config::QueueConfig;
//!
//! let queue = JobQueue::create("audio", QueueConfig::new(5, 1));
//! let mut ticket = queue.submit(Job::new(outputs))?;
//! println!("Position: {}", ticket.position());
//!
//! ticket.wait_for_turn().await?;
//! // ... run the processor ...
//! ticket.complete();
//! ```

mod error;
mod job_queue;
mod types;

pub use error::QueueError;
pub use job_queue::{JobQueue, Ticket};
pub use types::{Job, JobId, JobOutcome, JobState, JobStatus, QueueStats};
