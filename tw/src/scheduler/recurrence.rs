//! Recurrence policy for repeating tasks
//!
//! After missed intervals only the next future occurrence is created; the
//! missed ones are skipped, not backfilled.

use taskstore::now_ms;
use tracing::{debug, warn};

use super::core::Scheduler;
use super::outcome::ScheduleResult;
use crate::domain::{MS_PER_SEC, Task, TaskStatus};
use crate::error::{WorkerError, WorkerResult};
use crate::repository::TaskQuery;

/// Next run time strictly after `now` on the grid `run_at + k * repeat_interval`
///
/// Returns `None` when `repeat_interval <= 0` (never repeats). All times are
/// Unix milliseconds; the interval is in seconds.
pub fn next_run_at(run_at: i64, repeat_interval: i64, now: i64) -> WorkerResult<Option<i64>> {
    if repeat_interval <= 0 {
        return Ok(None);
    }
    let overflow = || WorkerError::InvalidInterval(format!("repeat interval {}s overflows the run time", repeat_interval));

    let step = repeat_interval.checked_mul(MS_PER_SEC).ok_or_else(overflow)?;
    let mut next = run_at.checked_add(step).ok_or_else(overflow)?;
    if next <= now {
        let behind = now.checked_sub(next).ok_or_else(overflow)?;
        let skipped = behind / step + 1;
        next = skipped
            .checked_mul(step)
            .and_then(|delta| next.checked_add(delta))
            .ok_or_else(overflow)?;
    }
    Ok(Some(next))
}

impl Scheduler {
    /// Create the next occurrence of a repeating task
    pub fn create_repeated(&self, task: &Task) -> WorkerResult<ScheduleResult> {
        self.create_repeated_at(task, now_ms())
    }

    /// Create the next occurrence of a repeating task as of `now`
    ///
    /// Declines with [`ScheduleResult::Duplicate`] when a pending task with
    /// the same identity hash and run time already exists.
    pub fn create_repeated_at(&self, task: &Task, now: i64) -> WorkerResult<ScheduleResult> {
        debug!(id = %task.id, repeat_interval = task.repeat_interval, now, "Scheduler::create_repeated_at: called");

        let Some(run_at) = next_run_at(task.run_at, task.repeat_interval, now)? else {
            debug!(id = %task.id, "Scheduler::create_repeated_at: task does not repeat");
            self.record(&ScheduleResult::NotRepeating);
            return Ok(ScheduleResult::NotRepeating);
        };

        let identity_hash = if task.identity_hash.is_empty() {
            task.compute_hash()?
        } else {
            task.identity_hash.clone()
        };

        let query = TaskQuery::new()
            .identity_hash(identity_hash.clone())
            .run_at(run_at)
            .pending();
        let next = Task {
            id: String::new(),
            handler: task.handler.clone(),
            args: task.args.clone(),
            kwargs: task.kwargs.clone(),
            identity_hash,
            error: String::new(),
            schedule_interval: None,
            repeat_interval: task.repeat_interval,
            run_at,
            created_at: 0,
            completed_at: None,
            status: TaskStatus::Waiting,
            updated_at: 0,
        };

        let result = match self.repository().insert_unless_exists(&query, next)? {
            Some(created) => {
                debug!(handler = %created.handler, run_at, "scheduling task");
                ScheduleResult::Scheduled(created)
            }
            None => {
                warn!(handler = %task.handler, run_at, "trying to schedule task with same hash and schedule");
                ScheduleResult::Duplicate {
                    reason: format!("{} already pending for run_at {}", task.summary(), run_at),
                }
            }
        };
        self.record(&result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Repeat;
    use crate::repository::{MemoryRepository, Repository};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    const DAY_MS: i64 = Repeat::DAILY * MS_PER_SEC;

    fn scheduler() -> (Scheduler, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        (Scheduler::new(repo.clone()), repo)
    }

    #[test]
    fn test_next_run_at_never() {
        assert_eq!(next_run_at(0, 0, 100).unwrap(), None);
        assert_eq!(next_run_at(0, -5, 100).unwrap(), None);
    }

    #[test]
    fn test_next_run_at_on_time() {
        // one interval ahead is already in the future
        assert_eq!(next_run_at(1_000, 60, 2_000).unwrap(), Some(61_000));
    }

    #[test]
    fn test_next_run_at_exact_boundary_is_skipped() {
        // a candidate equal to now is not strictly in the future
        assert_eq!(next_run_at(0, 60, 60_000).unwrap(), Some(120_000));
    }

    #[test]
    fn test_next_run_at_overflow() {
        assert!(matches!(
            next_run_at(0, i64::MAX, 0),
            Err(WorkerError::InvalidInterval(_))
        ));
    }

    #[test]
    fn test_ten_days_overdue_schedules_single_future_occurrence() {
        let (scheduler, repo) = scheduler();
        let now = 1_700_000_000_000;
        let run_at = now - 10 * DAY_MS + 5_000;
        let task = Task::new("digest", json!(["weekly"]), json!({}))
            .unwrap()
            .with_run_at(run_at)
            .with_repeat(Repeat::DAILY);

        let result = scheduler.create_repeated_at(&task, now).unwrap();
        let next = result.into_task().unwrap();

        assert_eq!(next.run_at, run_at + 10 * DAY_MS);
        assert!(next.run_at > now);
        assert!(next.run_at - DAY_MS <= now);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_next_occurrence_copies_payload() {
        let (scheduler, _repo) = scheduler();
        let task = Task::new("sync", json!([1, 2]), json!({"full": true}))
            .unwrap()
            .with_run_at(0)
            .with_repeat(Repeat::HOURLY)
            .with_schedule(30);

        let next = scheduler.create_repeated_at(&task, 10).unwrap().into_task().unwrap();
        assert_eq!(next.handler, "sync");
        assert_eq!(next.args, json!([1, 2]));
        assert_eq!(next.kwargs, json!({"full": true}));
        assert_eq!(next.identity_hash, task.identity_hash);
        assert_eq!(next.repeat_interval, Repeat::HOURLY);
        assert_eq!(next.schedule_interval, None);
        assert_eq!(next.status, TaskStatus::Waiting);
        assert!(next.completed_at.is_none());
        assert!(!next.id.is_empty());
    }

    #[test]
    fn test_second_call_is_duplicate() {
        let (scheduler, repo) = scheduler();
        let task = Task::bare("cleanup").unwrap().with_run_at(0).with_repeat(Repeat::DAILY);

        assert!(scheduler.create_repeated_at(&task, 1_000).unwrap().is_scheduled());
        assert!(scheduler.create_repeated_at(&task, 1_000).unwrap().is_duplicate());
        assert_eq!(repo.len(), 1);

        let stats = scheduler.stats();
        assert_eq!(stats.total_scheduled, 1);
        assert_eq!(stats.total_duplicates, 1);
    }

    #[test]
    fn test_completed_occurrence_does_not_block() {
        let (scheduler, repo) = scheduler();
        let task = Task::bare("cleanup").unwrap().with_run_at(0).with_repeat(Repeat::DAILY);

        let mut first = scheduler.create_repeated_at(&task, 1_000).unwrap().into_task().unwrap();
        first.complete(2_000).unwrap();
        repo.update(&first).unwrap();

        assert!(scheduler.create_repeated_at(&task, 1_000).unwrap().is_scheduled());
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_never_repeat_creates_nothing() {
        let (scheduler, repo) = scheduler();
        let task = Task::bare("once").unwrap();
        assert_eq!(scheduler.create_repeated_at(&task, 1_000).unwrap(), ScheduleResult::NotRepeating);
        assert!(repo.is_empty());
    }

    #[test]
    fn test_missing_hash_is_recomputed() {
        let (scheduler, _repo) = scheduler();
        let mut task = Task::new("legacy", json!(["a"]), json!({})).unwrap().with_repeat(60);
        let expected = task.identity_hash.clone();
        task.identity_hash = String::new();

        let next = scheduler.create_repeated_at(&task, task.run_at).unwrap().into_task().unwrap();
        assert_eq!(next.identity_hash, expected);
    }

    proptest! {
        #[test]
        fn prop_next_run_is_future_and_on_grid(
            run_at in -1_000_000_000_000i64..2_000_000_000_000,
            repeat in 1i64..5_000_000,
            now in 0i64..2_000_000_000_000,
        ) {
            let next = next_run_at(run_at, repeat, now).unwrap().unwrap();
            let step = repeat * MS_PER_SEC;
            prop_assert!(next > now);
            prop_assert!(next > run_at);
            prop_assert_eq!((next - run_at) % step, 0);
            // smallest such value: one step earlier is either not future or the original run
            prop_assert!(next - step <= now || next - step == run_at);
        }
    }
}
