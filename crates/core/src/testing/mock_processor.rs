//! Mock processor for testing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::processor::{
    MediaInput, OutputOptions, ProcessedFile, ProcessedStream, Processor, ProcessorError,
};

/// A recorded `process` call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub outputs: Vec<OutputOptions>,
}

#[derive(Debug, Clone)]
struct Settings {
    delay: Duration,
    payload: Bytes,
    fail_after: Option<(usize, String)>,
    next_error: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            payload: Bytes::from_static(b"mock output"),
            fail_after: None,
            next_error: None,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    max_concurrent: AtomicUsize,
    cancelled: AtomicUsize,
    completed: AtomicUsize,
}

/// Decrements the active count when a run's stream is dropped.
struct ActiveGuard(Arc<Counters>);

impl ActiveGuard {
    fn enter(counters: Arc<Counters>) -> Self {
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_concurrent.fetch_max(active, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock implementation of the Processor trait.
///
/// Produces one in-memory file per requested output, named like the ffmpeg
/// processor names them. Provides controllable behavior for testing:
/// - Delay before each output, honoring cancellation
/// - Failure after a given number of outputs
/// - Call recording and concurrency tracking
#[derive(Debug, Default)]
pub struct MockProcessor {
    settings: Mutex<Settings>,
    calls: Mutex<Vec<RecordedCall>>,
    counters: Arc<Counters>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulated processing time per output.
    pub fn set_delay(&self, delay: Duration) {
        self.settings().delay = delay;
    }

    /// Bytes every produced file contains.
    pub fn set_payload(&self, payload: impl Into<Bytes>) {
        self.settings().payload = payload.into();
    }

    /// Fail every run once `produced` outputs have been delivered.
    pub fn fail_after(&self, produced: usize, reason: impl Into<String>) {
        self.settings().fail_after = Some((produced, reason.into()));
    }

    /// Fail only the next run, before producing anything.
    pub fn set_next_error(&self, reason: impl Into<String>) {
        self.settings().next_error = Some(reason.into());
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs that observed their cancellation token.
    pub fn cancelled_count(&self) -> usize {
        self.counters.cancelled.load(Ordering::SeqCst)
    }

    /// Runs that delivered every output.
    pub fn completed_count(&self) -> usize {
        self.counters.completed.load(Ordering::SeqCst)
    }

    /// Runs in progress right now.
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous runs seen.
    pub fn max_concurrent(&self) -> usize {
        self.counters.max_concurrent.load(Ordering::SeqCst)
    }
}

struct Run {
    outputs: Vec<OutputOptions>,
    index: usize,
    settings: Settings,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    _guard: ActiveGuard,
    done: bool,
}

impl Run {
    async fn next(&mut self) -> Option<Result<ProcessedFile, ProcessorError>> {
        if self.done {
            return None;
        }
        if let Some(reason) = self.settings.next_error.take() {
            self.done = true;
            return Some(Err(ProcessorError::process_failed(reason, None)));
        }
        if self.index >= self.outputs.len() {
            self.done = true;
            self.counters.completed.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.settings.delay) => {}
            _ = self.cancel.cancelled() => {
                self.done = true;
                self.counters.cancelled.fetch_add(1, Ordering::SeqCst);
                return Some(Err(ProcessorError::Cancelled));
            }
        }

        if let Some((after, reason)) = &self.settings.fail_after {
            if self.index == *after {
                self.done = true;
                return Some(Err(ProcessorError::process_failed(reason.clone(), None)));
            }
        }

        let output = &self.outputs[self.index];
        self.index += 1;
        Some(Ok(ProcessedFile::from_bytes(
            format!("file{}.{}", self.index, output.extension()),
            output.mime_type(),
            self.settings.payload.clone(),
        )))
    }
}

#[async_trait]
impl Processor for MockProcessor {
    fn name(&self) -> &str {
        "mock"
    }

    fn process(
        &self,
        _input: MediaInput,
        outputs: Vec<OutputOptions>,
        cancel: CancellationToken,
    ) -> ProcessedStream {
        let settings = {
            let mut current = self.settings();
            let snapshot = current.clone();
            current.next_error = None;
            snapshot
        };
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                outputs: outputs.clone(),
            });

        let run = Run {
            outputs,
            index: 0,
            settings,
            cancel,
            counters: self.counters.clone(),
            _guard: ActiveGuard::enter(self.counters.clone()),
            done: false,
        };

        futures::stream::unfold(run, |mut run| async move {
            run.next().await.map(|item| (item, run))
        })
        .boxed()
    }

    async fn validate(&self) -> Result<(), ProcessorError> {
        Ok(())
    }
}
