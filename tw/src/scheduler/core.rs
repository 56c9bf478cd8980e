//! Scheduler - the entry point for creating and settling tasks

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::outcome::{ScheduleResult, SchedulerStats};
use crate::domain::Task;
use crate::error::WorkerResult;
use crate::repository::Repository;

/// Creates tasks against a shared repository
///
/// Recurring and one-shot scheduling live in `recurrence.rs` and
/// `oneshot.rs`; this file holds construction, plain enqueueing and
/// settlement of finished tasks.
pub struct Scheduler {
    repo: Arc<dyn Repository>,
    stats: Mutex<SchedulerStats>,
}

impl Scheduler {
    /// Create a new scheduler over the given repository
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        debug!("Scheduler::new: called");
        Self {
            repo,
            stats: Mutex::new(SchedulerStats::default()),
        }
    }

    /// The repository this scheduler writes to
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Snapshot of the scheduling counters
    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub(crate) fn record(&self, result: &ScheduleResult) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.record(result);
        }
    }

    /// Store a task as-is, without any duplicate check
    pub fn enqueue(&self, task: Task) -> WorkerResult<Task> {
        debug!(handler = %task.handler, run_at = task.run_at, "Scheduler::enqueue: called");
        let stored = self.repo.insert(task)?;
        info!(id = %stored.id, task = %stored.summary(), run_at = stored.run_at, "Enqueued task");
        self.record(&ScheduleResult::Scheduled(stored.clone()));
        Ok(stored)
    }

    /// Waiting tasks eligible to run at `now`, earliest first
    pub fn due(&self, now: i64) -> WorkerResult<Vec<Task>> {
        debug!(now, "Scheduler::due: called");
        self.repo.list_due(now)
    }

    /// Record the outcome of running a task, then schedule its next occurrence
    ///
    /// `Ok(())` completes the task and `Err(message)` fails it; either way the
    /// transition is persisted before the recurrence policy runs, so a
    /// repeating task keeps repeating after a failure.
    pub fn settle(&self, task: &mut Task, outcome: Result<(), String>, at: i64) -> WorkerResult<ScheduleResult> {
        debug!(id = %task.id, ok = outcome.is_ok(), at, "Scheduler::settle: called");
        match outcome {
            Ok(()) => task.complete(at)?,
            Err(error) => task.fail(at, error)?,
        }
        self.repo.update_if_pending(task)?;
        info!(id = %task.id, task = %task.summary(), status = %task.status, "Settled task");

        if let Ok(mut stats) = self.stats.lock() {
            stats.total_settled += 1;
        }
        self.create_repeated_at(task, at)
    }
}
