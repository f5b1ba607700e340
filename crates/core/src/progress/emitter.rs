use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::multipart::{receiver_stream, StreamError, StreamItem, StreamResult};
use crate::processor::{MediaInput, ProcessedStream, Processor};
use crate::queue::{JobState, Ticket};

use super::events::{progress_percent, StatusEvent};

/// How a job's event sequence ended.
#[derive(Debug, PartialEq, Eq)]
enum Finish {
    Completed,
    Failed(String),
    Cancelled,
}

/// Drives one admitted job and reports its lifecycle as stream items.
///
/// Sequence for a job with `N` outputs:
/// `QueuePosition*`, `QueuePosition{0}`, `Progress{0}`, then per output
/// `File`, `Progress{round(k * 100 / N)}`. A processor failure ends the
/// sequence with `ProcessingError`; a cancellation ends it silently.
pub struct ProgressEmitter {
    ticket: Ticket,
    processor: Arc<dyn Processor>,
}

impl ProgressEmitter {
    pub fn new(ticket: Ticket, processor: Arc<dyn Processor>) -> Self {
        Self { ticket, processor }
    }

    /// Runs the emitter on a background task feeding a channel of `buffer`
    /// items, and returns the consuming end as a stream.
    ///
    /// Dropping the stream cancels the job.
    pub fn spawn(self, input: MediaInput, buffer: usize) -> BoxStream<'static, StreamResult> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(self.run(input, tx));
        receiver_stream(rx)
    }

    /// Runs the job to a terminal state, sending items into `tx`.
    pub async fn run(self, input: MediaInput, tx: mpsc::Sender<StreamResult>) {
        let Self { ticket, processor } = self;
        let cancel = ticket.cancel_token();
        let id = ticket.id().clone();

        let finish = match wait_for_turn(&ticket, &cancel, &tx).await {
            Ok(()) => execute(&ticket, processor.as_ref(), input, &cancel, &tx).await,
            Err(finish) => finish,
        };

        debug!("Job {}: event stream finished ({:?})", id, finish);
        match finish {
            Finish::Completed => ticket.complete(),
            Finish::Failed(message) => ticket.fail(message),
            Finish::Cancelled => {
                let _ = tx.try_send(Err(StreamError::Aborted));
                ticket.acknowledge_cancel();
            }
        }
    }
}

async fn emit(tx: &mpsc::Sender<StreamResult>, item: impl Into<StreamItem>) -> Result<(), Finish> {
    tx.send(Ok(item.into())).await.map_err(|_| Finish::Cancelled)
}

/// Reports queue positions until the job is promoted. The last position sent
/// before returning is always 0.
async fn wait_for_turn(
    ticket: &Ticket,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<StreamResult>,
) -> Result<(), Finish> {
    let mut status = ticket.subscribe();
    let mut last_position = None;

    loop {
        let current = status.borrow_and_update().clone();
        match current.state {
            JobState::Queued => {
                if last_position != Some(current.position) {
                    emit(tx, StatusEvent::position(current.position)).await?;
                    last_position = Some(current.position);
                }
            }
            JobState::Running => {
                if last_position != Some(0) {
                    emit(tx, StatusEvent::position(0)).await?;
                }
                return Ok(());
            }
            _ => return Err(Finish::Cancelled),
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Err(Finish::Cancelled);
                }
            }
            _ = cancel.cancelled() => {
                ticket.cancel();
                return Err(Finish::Cancelled);
            }
            _ = tx.closed() => {
                ticket.cancel();
                return Err(Finish::Cancelled);
            }
        }
    }
}

async fn execute(
    ticket: &Ticket,
    processor: &dyn Processor,
    input: MediaInput,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<StreamResult>,
) -> Finish {
    let total = ticket.outputs().len();
    if let Err(finish) = emit(tx, StatusEvent::progress(0)).await {
        return finish;
    }

    let mut files = processor.process(input, ticket.outputs().to_vec(), cancel.clone());
    let mut produced = 0;
    let mut last_progress = 0;

    loop {
        let next = tokio::select! {
            next = files.next() => next,
            _ = cancel.cancelled() => break,
            _ = tx.closed() => {
                cancel.cancel();
                break;
            }
        };

        match next {
            Some(Ok(file)) => {
                if cancel.is_cancelled() {
                    break;
                }
                produced += 1;
                last_progress = progress_percent(produced, total);
                if let Err(finish) = emit(tx, file).await {
                    cancel.cancel();
                    drain(files).await;
                    return finish;
                }
                if let Err(finish) = emit(tx, StatusEvent::progress(last_progress)).await {
                    cancel.cancel();
                    drain(files).await;
                    return finish;
                }
            }
            Some(Err(e)) if e.is_cancelled() || cancel.is_cancelled() => break,
            Some(Err(e)) => {
                let message = e.to_string();
                warn!("Job {} failed after {} of {} outputs: {}", ticket.id(), produced, total, message);
                let _ = emit(tx, StatusEvent::error(message.clone())).await;
                return Finish::Failed(message);
            }
            None => {
                if last_progress < 100 {
                    if produced < total {
                        warn!("Job {}: processor produced {} of {} outputs", ticket.id(), produced, total);
                    }
                    if let Err(finish) = emit(tx, StatusEvent::progress(100)).await {
                        return finish;
                    }
                }
                return Finish::Completed;
            }
        }
    }

    // Cancelled while running: wait for the processor to wind down.
    drain(files).await;
    Finish::Cancelled
}

/// Consumes the rest of a cancelled run, discarding anything it produced.
async fn drain(mut files: ProcessedStream) {
    while let Some(item) = files.next().await {
        if item.is_err() {
            break;
        }
    }
}
