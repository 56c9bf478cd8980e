//! One-shot delayed tasks

use taskstore::now_ms;
use tracing::{debug, warn};

use super::core::Scheduler;
use super::outcome::ScheduleResult;
use crate::domain::{MS_PER_SEC, Task};
use crate::error::{WorkerError, WorkerResult};
use crate::repository::TaskQuery;

impl Scheduler {
    /// Schedule `handler` to run once, `schedule_interval` seconds from now
    pub fn create_scheduled_task(&self, handler: &str, schedule_interval: i64) -> WorkerResult<ScheduleResult> {
        self.create_scheduled_task_at(handler, schedule_interval, now_ms())
    }

    /// Schedule `handler` to run once, `schedule_interval` seconds after `now`
    ///
    /// At most one pending task exists per `(handler, schedule_interval)`;
    /// while one is pending, further calls return [`ScheduleResult::Duplicate`].
    /// The task carries no arguments and does not repeat.
    pub fn create_scheduled_task_at(&self, handler: &str, schedule_interval: i64, now: i64) -> WorkerResult<ScheduleResult> {
        debug!(%handler, schedule_interval, now, "Scheduler::create_scheduled_task_at: called");

        let run_at = schedule_interval
            .checked_mul(MS_PER_SEC)
            .and_then(|delay| now.checked_add(delay))
            .ok_or_else(|| {
                WorkerError::InvalidInterval(format!("schedule interval {}s overflows the run time", schedule_interval))
            })?;

        let query = TaskQuery::new()
            .handler(handler)
            .schedule_interval(schedule_interval)
            .pending();
        let task = Task::bare(handler)?
            .with_schedule(schedule_interval)
            .with_run_at(run_at);

        let result = match self.repository().insert_unless_exists(&query, task)? {
            Some(created) => {
                debug!(%handler, run_at, "scheduling task");
                ScheduleResult::Scheduled(created)
            }
            None => {
                warn!(%handler, schedule_interval, "trying to schedule task with same hash and schedule");
                ScheduleResult::Duplicate {
                    reason: format!("{} already pending with schedule interval {}s", handler, schedule_interval),
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
    use crate::domain::{Repeat, TaskStatus};
    use crate::repository::{MemoryRepository, Repository};
    use std::sync::Arc;

    fn scheduler() -> (Scheduler, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        (Scheduler::new(repo.clone()), repo)
    }

    #[test]
    fn test_schedules_after_delay() {
        let (scheduler, _repo) = scheduler();
        let task = scheduler
            .create_scheduled_task_at("cleanup", 300, 1_000)
            .unwrap()
            .into_task()
            .unwrap();

        assert_eq!(task.handler, "cleanup");
        assert_eq!(task.run_at, 1_000 + 300_000);
        assert_eq!(task.schedule_interval, Some(300));
        assert_eq!(task.repeat_interval, Repeat::NEVER);
        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.args, serde_json::json!([]));
    }

    #[test]
    fn test_pending_one_shot_blocks_second() {
        let (scheduler, repo) = scheduler();
        assert!(scheduler.create_scheduled_task_at("cleanup", 300, 0).unwrap().is_scheduled());
        assert!(scheduler.create_scheduled_task_at("cleanup", 300, 50).unwrap().is_duplicate());
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_different_interval_is_independent() {
        let (scheduler, repo) = scheduler();
        assert!(scheduler.create_scheduled_task_at("cleanup", 300, 0).unwrap().is_scheduled());
        assert!(scheduler.create_scheduled_task_at("cleanup", 600, 0).unwrap().is_scheduled());
        assert!(scheduler.create_scheduled_task_at("other", 300, 0).unwrap().is_scheduled());
        assert_eq!(repo.len(), 3);
    }

    #[test]
    fn test_finished_one_shot_allows_new() {
        let (scheduler, repo) = scheduler();
        let mut first = scheduler.create_scheduled_task_at("cleanup", 300, 0).unwrap().into_task().unwrap();
        first.fail(400_000, "boom").unwrap();
        repo.update(&first).unwrap();

        assert!(scheduler.create_scheduled_task_at("cleanup", 300, 500_000).unwrap().is_scheduled());
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_zero_interval_runs_now() {
        let (scheduler, _repo) = scheduler();
        let task = scheduler.create_scheduled_task_at("now", 0, 42).unwrap().into_task().unwrap();
        assert_eq!(task.run_at, 42);
        assert!(task.is_due(42));
    }

    #[test]
    fn test_overflowing_interval() {
        let (scheduler, repo) = scheduler();
        assert!(matches!(
            scheduler.create_scheduled_task_at("x", i64::MAX, 0),
            Err(WorkerError::InvalidInterval(_))
        ));
        assert!(repo.is_empty());
    }
}
