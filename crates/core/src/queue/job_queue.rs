//! Job queue implementation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::QueueConfig;
use crate::processor::OutputOptions;

use super::error::QueueError;
use super::types::{Job, JobId, JobOutcome, JobState, JobStatus, QueueStats};

/// Admission controller holding at most `capacity` jobs and running at most
/// `parallelism` of them.
///
/// Cheaply cloneable; all clones share the same membership. Every mutation
/// (admit, promote, finish, cancel) happens under one lock, so FIFO order is
/// never observed half-updated.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: QueueConfig,
    state: Mutex<QueueState>,
}

struct Entry {
    state: JobState,
    status: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    queued: VecDeque<JobId>,
    running: HashSet<JobId>,
    entries: HashMap<JobId, Entry>,
    shut_down: bool,
    completed: u64,
    failed: u64,
    cancelled: u64,
    rejected: u64,
}

impl QueueState {
    fn held(&self) -> usize {
        self.queued.len() + self.running.len()
    }

    /// Moves the longest-waiting jobs into free running slots, then
    /// republishes the positions of everything still waiting.
    fn promote(&mut self, name: &str, parallelism: usize) {
        while self.running.len() < parallelism {
            let Some(id) = self.queued.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.state = JobState::Running;
                entry.status.send_replace(JobStatus::with_state(JobState::Running));
                debug!("Queue {}: job {} promoted to running", name, id);
            }
            self.running.insert(id);
        }
        self.refresh_positions();
    }

    fn refresh_positions(&self) {
        for (position, id) in self.queued.iter().enumerate() {
            if let Some(entry) = self.entries.get(id) {
                entry.status.send_if_modified(|status| {
                    if status.position == position {
                        false
                    } else {
                        status.position = position;
                        true
                    }
                });
            }
        }
    }

    /// Removes a job for good and publishes its terminal state.
    fn retire(&mut self, id: &JobId, state: JobState) {
        if let Some(entry) = self.entries.remove(id) {
            entry.status.send_replace(JobStatus::with_state(state));
        }
        match state {
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
            JobState::Cancelled => self.cancelled += 1,
            JobState::Queued | JobState::Running => {}
        }
    }
}

impl JobQueue {
    /// Creates an independent queue.
    pub fn create(name: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a job or rejects it immediately. Never waits.
    pub fn submit(&self, job: Job) -> Result<Ticket, QueueError> {
        let QueueConfig {
            capacity,
            parallelism,
        } = self.inner.config;
        let mut state = self.lock();

        if state.shut_down {
            return Err(QueueError::ShutDown);
        }
        if state.entries.contains_key(job.id()) {
            return Err(QueueError::AlreadyAdmitted(job.id().clone()));
        }
        if state.held() >= capacity {
            state.rejected += 1;
            debug!(
                "Queue {}: rejected job {} ({} held)",
                self.inner.name,
                job.id(),
                state.held()
            );
            return Err(QueueError::Rejected { capacity });
        }

        let enqueued_at = state.next_seq;
        state.next_seq += 1;

        let position = state.queued.len();
        let (status_tx, status_rx) = watch::channel(JobStatus::queued(position));
        state.entries.insert(
            job.id().clone(),
            Entry {
                state: JobState::Queued,
                status: status_tx,
                cancel: job.cancel_token().clone(),
            },
        );
        state.queued.push_back(job.id().clone());
        debug!(
            "Queue {}: admitted job {} at position {}",
            self.inner.name,
            job.id(),
            position
        );

        state.promote(&self.inner.name, parallelism);
        drop(state);

        Ok(Ticket {
            job,
            enqueued_at,
            queue: self.clone(),
            status: status_rx,
            settled: false,
        })
    }

    /// Cancels a job.
    ///
    /// A queued job leaves the FIFO immediately and never runs. A running job
    /// only has its cancellation token fired; it becomes `Cancelled` once its
    /// ticket acknowledges. Returns false if the queue no longer holds the job.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut state = self.lock();
        let current = match state.entries.get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                entry.state
            }
            None => return false,
        };

        if current == JobState::Queued {
            state.queued.retain(|queued| queued != id);
            state.retire(id, JobState::Cancelled);
            state.refresh_positions();
            debug!("Queue {}: cancelled queued job {}", self.inner.name, id);
        } else {
            debug!(
                "Queue {}: cancellation requested for running job {}",
                self.inner.name, id
            );
        }
        true
    }

    /// Records the end of a job and frees its slot.
    fn finish(&self, id: &JobId, outcome: JobOutcome) {
        let mut state = self.lock();
        let Some(current) = state.entries.get(id).map(|entry| entry.state) else {
            return;
        };

        let terminal = match current {
            JobState::Running => {
                state.running.remove(id);
                outcome.state()
            }
            // A job that never ran can only have been cancelled.
            _ => {
                state.queued.retain(|queued| queued != id);
                JobState::Cancelled
            }
        };
        state.retire(id, terminal);
        match outcome.reason().filter(|_| terminal == JobState::Failed) {
            Some(reason) => debug!(
                "Queue {}: job {} finished as failed: {}",
                self.inner.name, id, reason
            ),
            None => debug!(
                "Queue {}: job {} finished as {}",
                self.inner.name,
                id,
                terminal.as_str()
            ),
        }

        state.promote(&self.inner.name, self.inner.config.parallelism);
    }

    /// Stops admitting work, cancels every queued job and signals every
    /// running one.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shut_down = true;

        let queued: Vec<JobId> = state.queued.drain(..).collect();
        for id in &queued {
            if let Some(entry) = state.entries.get(id) {
                entry.cancel.cancel();
            }
            state.retire(id, JobState::Cancelled);
        }
        for id in &state.running {
            if let Some(entry) = state.entries.get(id) {
                entry.cancel.cancel();
            }
        }
        debug!(
            "Queue {}: shut down ({} queued cancelled, {} running signalled)",
            self.inner.name,
            queued.len(),
            state.running.len()
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Number of queued jobs.
    pub fn queued_len(&self) -> usize {
        self.lock().queued.len()
    }

    /// Number of running jobs.
    pub fn running_len(&self) -> usize {
        self.lock().running.len()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            name: self.inner.name.clone(),
            capacity: self.inner.config.capacity,
            parallelism: self.inner.config.parallelism,
            queued: state.queued.len(),
            running: state.running.len(),
            completed: state.completed,
            failed: state.failed,
            cancelled: state.cancelled,
            rejected: state.rejected,
        }
    }
}

/// Handle to an admitted job.
///
/// Dropping an unsettled ticket cancels the job: a queued job leaves the
/// FIFO, a running job is recorded as `Cancelled` and its slot is freed.
pub struct Ticket {
    job: Job,
    enqueued_at: u64,
    queue: JobQueue,
    status: watch::Receiver<JobStatus>,
    settled: bool,
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("id", self.id())
            .field("queue", &self.queue.name())
            .field("status", &self.status())
            .finish()
    }
}

impl Ticket {
    pub fn id(&self) -> &JobId {
        self.job.id()
    }

    pub fn outputs(&self) -> &[OutputOptions] {
        self.job.outputs()
    }

    /// Admission order within the queue.
    pub fn enqueued_at(&self) -> u64 {
        self.enqueued_at
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub fn position(&self) -> usize {
        self.status().position
    }

    /// Subscribes to position and state changes.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.job.cancel_token().clone()
    }

    pub fn cancel(&self) {
        self.queue.cancel(self.id());
    }

    /// Waits until the job is promoted to `Running`.
    ///
    /// Fails with [`QueueError::Cancelled`] if the job was cancelled (or the
    /// queue shut down) while waiting.
    pub async fn wait_for_turn(&mut self) -> Result<(), QueueError> {
        let cancel = self.cancel_token();
        loop {
            match self.status.borrow_and_update().state {
                JobState::Queued => {}
                JobState::Running => return Ok(()),
                _ => return Err(QueueError::Cancelled),
            }

            tokio::select! {
                changed = self.status.changed() => {
                    if changed.is_err() && self.status.borrow().state != JobState::Running {
                        return Err(QueueError::Cancelled);
                    }
                }
                _ = cancel.cancelled() => {
                    self.queue.cancel(self.job.id());
                }
            }
        }
    }

    /// Marks a running job as completed.
    pub fn complete(self) {
        self.settle(JobOutcome::Completed);
    }

    /// Marks a running job as failed.
    pub fn fail(self, message: impl Into<String>) {
        self.settle(JobOutcome::Failed(message.into()));
    }

    /// Acknowledges a cancellation once the processor has stopped.
    pub fn acknowledge_cancel(self) {
        self.settle(JobOutcome::Cancelled);
    }

    fn settle(mut self, outcome: JobOutcome) {
        self.settled = true;
        self.queue.finish(self.job.id(), outcome);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.settled {
            self.job.cancel_token().cancel();
            self.queue.finish(self.job.id(), JobOutcome::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_err, task};

    fn queue(capacity: usize, parallelism: usize) -> JobQueue {
        JobQueue::create("test", QueueConfig::new(capacity, parallelism))
    }

    fn job() -> Job {
        Job::new(Vec::new())
    }

    #[test]
    fn test_first_job_runs_immediately() {
        let queue = queue(5, 1);
        let ticket = queue.submit(job()).unwrap();
        assert_eq!(ticket.status().state, JobState::Running);
        assert_eq!(ticket.position(), 0);
        assert_eq!(queue.running_len(), 1);
        assert_eq!(queue.queued_len(), 0);
    }

    #[test]
    fn test_rejects_beyond_capacity() {
        let queue = queue(3, 1);
        let tickets: Vec<_> = (0..3).map(|_| queue.submit(job()).unwrap()).collect();

        let result = queue.submit(job());
        assert_eq!(result.unwrap_err(), QueueError::Rejected { capacity: 3 });
        assert_eq!(tickets.len(), 3);
        assert_eq!(queue.stats().rejected, 1);
    }

    #[test]
    fn test_duplicate_id_is_refused() {
        let queue = queue(5, 1);
        let _ticket = queue.submit(Job::with_id("same".into(), Vec::new())).unwrap();
        let result = queue.submit(Job::with_id("same".into(), Vec::new()));
        assert_eq!(result.unwrap_err(), QueueError::AlreadyAdmitted("same".into()));
    }

    #[test]
    fn test_positions_count_queued_jobs_ahead() {
        let queue = queue(5, 1);
        let a = queue.submit(job()).unwrap();
        let b = queue.submit(job()).unwrap();
        let c = queue.submit(job()).unwrap();

        assert_eq!(a.status().state, JobState::Running);
        assert_eq!(b.status(), JobStatus::queued(0));
        assert_eq!(c.status(), JobStatus::queued(1));
        assert!(a.enqueued_at() < b.enqueued_at());
        assert!(b.enqueued_at() < c.enqueued_at());
    }

    #[test]
    fn test_fifo_promotion() {
        let queue = queue(5, 1);
        let a = queue.submit(job()).unwrap();
        let b = queue.submit(job()).unwrap();
        let c = queue.submit(job()).unwrap();

        a.complete();
        assert_eq!(b.status().state, JobState::Running);
        assert_eq!(c.status(), JobStatus::queued(0));

        b.fail("broken");
        assert_eq!(c.status().state, JobState::Running);

        c.complete();
        let stats = queue.stats();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.running, 0);
    }

    #[test]
    fn test_parallelism_limits_running_jobs() {
        let queue = queue(4, 2);
        let tickets: Vec<_> = (0..4).map(|_| queue.submit(job()).unwrap()).collect();
        let states: Vec<_> = tickets.iter().map(|t| t.status().state).collect();
        assert_eq!(
            states,
            vec![
                JobState::Running,
                JobState::Running,
                JobState::Queued,
                JobState::Queued
            ]
        );
        assert_eq!(queue.running_len(), 2);
    }

    #[test]
    fn test_cancel_queued_job_removes_it() {
        let queue = queue(5, 1);
        let _a = queue.submit(job()).unwrap();
        let b = queue.submit(job()).unwrap();
        let c = queue.submit(job()).unwrap();

        b.cancel();
        assert_eq!(b.status().state, JobState::Cancelled);
        assert!(b.cancel_token().is_cancelled());
        assert_eq!(c.status(), JobStatus::queued(0));
        assert_eq!(queue.queued_len(), 1);
        assert_eq!(queue.stats().cancelled, 1);
    }

    #[test]
    fn test_cancel_running_job_waits_for_acknowledgement() {
        let queue = queue(5, 1);
        let a = queue.submit(job()).unwrap();
        let b = queue.submit(job()).unwrap();

        a.cancel();
        assert!(a.cancel_token().is_cancelled());
        assert_eq!(a.status().state, JobState::Running);
        assert_eq!(b.status().state, JobState::Queued);

        a.acknowledge_cancel();
        assert_eq!(b.status().state, JobState::Running);
        assert_eq!(queue.stats().cancelled, 1);
    }

    #[test]
    fn test_dropping_ticket_frees_slot() {
        let queue = queue(2, 1);
        let a = queue.submit(job()).unwrap();
        let b = queue.submit(job()).unwrap();
        let status = a.subscribe();

        drop(a);
        assert_eq!(status.borrow().state, JobState::Cancelled);
        assert_eq!(b.status().state, JobState::Running);
        assert!(queue.submit(job()).is_ok());
    }

    #[test]
    fn test_shutdown_cancels_queued_and_refuses_new_work() {
        let queue = queue(5, 1);
        let a = queue.submit(job()).unwrap();
        let b = queue.submit(job()).unwrap();

        queue.shutdown();
        assert!(queue.is_shut_down());
        assert!(a.cancel_token().is_cancelled());
        assert_eq!(a.status().state, JobState::Running);
        assert_eq!(b.status().state, JobState::Cancelled);
        assert_eq!(queue.submit(job()).unwrap_err(), QueueError::ShutDown);
    }

    #[tokio::test]
    async fn test_wait_for_turn_resolves_on_promotion() {
        let queue = queue(5, 1);
        let a = queue.submit(job()).unwrap();
        let mut b = queue.submit(job()).unwrap();

        let waiter = tokio::spawn(async move {
            b.wait_for_turn().await.map(|_| b)
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        a.complete();

        let b = waiter.await.unwrap().unwrap();
        assert_eq!(b.status().state, JobState::Running);
    }

    #[test]
    fn test_wait_for_turn_fails_when_cancelled() {
        let queue = queue(5, 1);
        let _a = queue.submit(job()).unwrap();
        let mut b = queue.submit(job()).unwrap();
        let cancel = b.cancel_token();

        {
            let mut wait = task::spawn(b.wait_for_turn());
            assert_pending!(wait.poll());

            cancel.cancel();
            assert!(wait.is_woken());
            assert_ready_err!(wait.poll());
        }
        assert_eq!(b.status().state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_respect_capacity() {
        let queue = queue(5, 2);
        let mut handles = Vec::new();
        for _ in 0..6 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move { queue.submit(job()) }));
        }

        let mut accepted = Vec::new();
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(ticket) => accepted.push(ticket),
                Err(QueueError::Rejected { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(accepted.len(), 5);
        assert_eq!(rejected, 1);
        assert!(queue.running_len() <= 2);
        assert_eq!(queue.running_len() + queue.queued_len(), 5);
    }
}
