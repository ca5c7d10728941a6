//! Queue & Worker: single-consumer FIFO on a plain OS thread,
//! `Mutex<State>` + `Condvar`, generalized down to an explicit
//! single-worker FIFO (one active job at a time).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crate::ids::{JobId, UserId};
use crate::job::{Job, JobState};
use crate::notifier::Notifier;
use crate::sync_ext::{CondvarExt, MutexExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Running,
}

struct QueueState {
    pending: VecDeque<Job>,
    phase: WorkerPhase,
    running_job_id: Option<JobId>,
    batch_job_count: u32,
    batch_started_at: Option<Instant>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            phase: WorkerPhase::Idle,
            running_job_id: None,
            batch_job_count: 0,
            batch_started_at: None,
        }
    }
}

/// Single-consumer FIFO job queue. `run_pipeline` is injected so the Queue
/// itself stays free of Downloader/Encoder/Fanout concerns — it only
/// sequences admission, dispatch, and batch-summary bookkeeping.
pub struct Queue {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

impl Queue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
                state: Mutex::new(QueueState::new()),
                condvar: Condvar::new(),
            })
    }

    /// Submit increases queue depth.
    pub fn submit(&self, job: Job) {
        let mut state = self.state.lock_unpoisoned();
        state.pending.push_back(job);
        self.condvar.notify_all();
    }

    /// Head-of-queue re-insertion used by the Suspension Registry on
    /// resume: unlike `submit`, this goes to the front.
    pub fn resubmit_at_head(&self, job: Job) {
        let mut state = self.state.lock_unpoisoned();
        state.pending.push_front(job);
        self.condvar.notify_all();
    }

    /// `clearqueue`: drains pending entries without touching the
    /// running job.
    pub fn clear_pending(&self) -> usize {
        let mut state = self.state.lock_unpoisoned();
        let cleared = state.pending.len();
        state.pending.clear();
        cleared
    }

    pub fn pending_snapshot(&self) -> Vec<JobId> {
        self.state.lock_unpoisoned().pending.iter().map(|j| j.id).collect()
    }

    pub fn phase(&self) -> WorkerPhase {
        self.state.lock_unpoisoned().phase
    }

    /// Blocks the calling (worker) thread until a job is available, then
    /// dequeues and marks Running.
    fn dequeue_and_start(&self) -> Job {
        let mut state = self.state.lock_unpoisoned();
        while state.pending.is_empty() {
            state = self.condvar.wait_unpoisoned(state);
        }
        let mut job = state.pending.pop_front().expect("checked non-empty above");
        job.state = JobState::Running;
        state.phase = WorkerPhase::Running;
        state.running_job_id = Some(job.id);
        if state.batch_started_at.is_none() {
            state.batch_started_at = Some(Instant::now());
        }
        job
    }

    fn finish(&self, job_count_delta: u32) -> Option<(u32, std::time::Duration)> {
        let mut state = self.state.lock_unpoisoned();
        state.phase = WorkerPhase::Idle;
        state.running_job_id = None;
        state.batch_job_count += job_count_delta;

        if state.pending.is_empty() && state.batch_job_count > 0 {
            let elapsed = state
            .batch_started_at
            .map(|start| start.elapsed())
            .unwrap_or_default();
            let summary = (state.batch_job_count, elapsed);
            state.batch_job_count = 0;
            state.batch_started_at = None;
            Some(summary)
        } else {
            None
        }
    }
}

/// Runs the Worker loop on the calling thread until `shutdown` is
/// requested out-of-band (tests call `run_once` instead). `pipeline` is a
/// closure implementing the full Download -> Encode -> Fanout dataflow; the
/// Worker only owns dispatch, not the pipeline's internals.
pub fn run_once(queue: &Arc<Queue>, notifier: &dyn Notifier, mut pipeline: impl FnMut(&mut Job)) {
    let mut job = queue.dequeue_and_start();
    let owner = job.owner;
    pipeline(&mut job);

    if let Some((count, elapsed)) = queue.finish(1) {
        let _ = notifier.send(
            owner,
            &format!("Batch complete: {count} job(s) in {:.1}s", elapsed.as_secs_f64()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobKind, JobSource};
    use crate::notifier::MessageHandle;

    struct RecordingNotifier {
        sent: Mutex<Vec<(UserId, String)>>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()) }
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, user: UserId, text: &str) -> anyhow::Result<MessageHandle> {
            self.sent.lock().unwrap().push((user, text.to_string()));
            Ok(MessageHandle("handle".to_string()))
        }
        fn edit(&self, _handle: &MessageHandle, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn delete(&self, _handle: &MessageHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn job(owner: UserId, name: &str) -> Job {
        Job::new(owner, JobKind::Encode, JobSource::Url("u".into()), name.into())
    }

    #[test]
    fn submit_then_run_once_transitions_idle_running_idle() {
        let queue = Queue::new();
        queue.submit(job(UserId(1), "a"));
        assert_eq!(queue.phase(), WorkerPhase::Idle);

        let notifier = RecordingNotifier::new();
        run_once(&queue, &notifier, |_job| {});

        assert_eq!(queue.phase(), WorkerPhase::Idle);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn resubmit_at_head_jumps_ahead_of_existing_pending_jobs() {
        let queue = Queue::new();
        queue.submit(job(UserId(1), "first"));
        queue.submit(job(UserId(1), "second"));
        queue.resubmit_at_head(job(UserId(1), "resumed"));

        let notifier = RecordingNotifier::new();
        let mut seen = Vec::new();
        run_once(&queue, &notifier, |job| seen.push(job.display_name.clone()));
        assert_eq!(seen, vec!["resumed".to_string()]);
    }

    #[test]
    fn clear_pending_drains_queue_without_touching_a_running_job() {
        let queue = Queue::new();
        queue.submit(job(UserId(1), "a"));
        queue.submit(job(UserId(1), "b"));
        let cleared = queue.clear_pending();
        assert_eq!(cleared, 2);
        assert!(queue.pending_snapshot().is_empty());
    }
}
