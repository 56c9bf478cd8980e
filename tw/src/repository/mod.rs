//! Task repository abstraction
//!
//! The scheduling core only talks to storage through [`Repository`]. Two
//! implementations ship: [`StoreRepository`] on top of TaskStore (SQLite) and
//! [`MemoryRepository`] for embedding and tests.

use std::cmp::Reverse;
use taskstore::{Filter, FilterOp, IndexValue, now_ms};
use uuid::Uuid;

use crate::domain::{Task, TaskStatus};
use crate::error::{WorkerError, WorkerResult};

mod memory;
mod store;

pub use memory::MemoryRepository;
pub use store::StoreRepository;

/// Field conditions for finding tasks; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub identity_hash: Option<String>,
    pub run_at: Option<i64>,
    pub handler: Option<String>,
    pub schedule_interval: Option<i64>,
    /// `Some(false)`: `completed_at` unset; `Some(true)`: set
    pub completed: Option<bool>,
    pub status: Option<TaskStatus>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity_hash(mut self, hash: impl Into<String>) -> Self {
        self.identity_hash = Some(hash.into());
        self
    }

    pub fn run_at(mut self, run_at: i64) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn schedule_interval(mut self, secs: i64) -> Self {
        self.schedule_interval = Some(secs);
        self
    }

    /// Only tasks whose `completed_at` is unset
    pub fn pending(mut self) -> Self {
        self.completed = Some(false);
        self
    }

    /// Only tasks whose `completed_at` is set
    pub fn finished(mut self) -> Self {
        self.completed = Some(true);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether a task satisfies every set condition
    pub fn matches(&self, task: &Task) -> bool {
        self.identity_hash.as_ref().is_none_or(|h| *h == task.identity_hash)
            && self.run_at.is_none_or(|r| r == task.run_at)
            && self.handler.as_ref().is_none_or(|h| *h == task.handler)
            && self.schedule_interval.is_none_or(|s| Some(s) == task.schedule_interval)
            && self.completed.is_none_or(|c| c == task.completed_at.is_some())
            && self.status.is_none_or(|s| s == task.status)
    }

    /// Translate into TaskStore index filters
    pub fn to_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(ref hash) = self.identity_hash {
            filters.push(Filter::eq("identity_hash", hash.as_str()));
        }
        if let Some(run_at) = self.run_at {
            filters.push(Filter::eq("run_at", run_at));
        }
        if let Some(ref handler) = self.handler {
            filters.push(Filter::eq("handler", handler.as_str()));
        }
        if let Some(schedule) = self.schedule_interval {
            filters.push(Filter::eq("schedule_interval", schedule));
        }
        match self.completed {
            Some(false) => filters.push(Filter::is_null("completed_at")),
            Some(true) => filters.push(Filter::not_null("completed_at")),
            None => {}
        }
        if let Some(status) = self.status {
            filters.push(Filter {
                field: "status".to_string(),
                op: FilterOp::Eq,
                value: IndexValue::String(status.to_string()),
            });
        }
        filters
    }
}

/// Persistent storage for tasks
///
/// All methods take `&self`; implementations handle their own locking so a
/// repository can be shared across threads.
pub trait Repository: Send + Sync {
    /// Whether any task matches the query
    fn exists(&self, query: &TaskQuery) -> WorkerResult<bool>;

    /// The first matching task, oldest insert first
    fn find_one(&self, query: &TaskQuery) -> WorkerResult<Option<Task>>;

    /// Insert a task, assigning its id and `created_at`
    fn insert(&self, task: Task) -> WorkerResult<Task>;

    /// Insert a task unless a task matching `query` already exists
    ///
    /// The check and the insert are one atomic step: concurrent callers with
    /// overlapping queries create at most one task between them. Returns the
    /// stored task, or `None` when a match already existed.
    fn insert_unless_exists(&self, query: &TaskQuery, task: Task) -> WorkerResult<Option<Task>>;

    /// Get a task by id
    fn get(&self, id: &str) -> WorkerResult<Option<Task>>;

    /// Persist changes to an existing task
    fn update(&self, task: &Task) -> WorkerResult<()>;

    /// Persist a settled task only while the stored copy is still pending
    ///
    /// The check and the write are one atomic step, so two stale copies of
    /// the same task cannot both settle it. Fails with
    /// [`crate::WorkerError::InvalidTransition`] when the stored task is
    /// already terminal.
    fn update_if_pending(&self, task: &Task) -> WorkerResult<()>;

    /// Matching tasks, newest `completed_at` first (pending tasks lead),
    /// then latest `run_at` first
    fn list(&self, query: &TaskQuery) -> WorkerResult<Vec<Task>>;

    /// Waiting tasks with `run_at <= now`, earliest first
    fn list_due(&self, now: i64) -> WorkerResult<Vec<Task>> {
        let mut due: Vec<Task> = self
            .list(&TaskQuery::new().status(TaskStatus::Waiting))?
            .into_iter()
            .filter(|t| t.is_due(now))
            .collect();
        due.sort_by_key(|t| t.run_at);
        Ok(due)
    }
}

/// Condition a stored task must meet to still be settled
pub(crate) fn pending_guard() -> TaskQuery {
    TaskQuery::new().status(TaskStatus::Waiting).pending()
}

/// Error for settling `task` over a stored copy that is already `stored`
pub(crate) fn already_settled(task: &Task, stored: TaskStatus) -> WorkerError {
    WorkerError::InvalidTransition {
        id: task.id.clone(),
        from: stored,
        to: task.status,
    }
}

/// Stamp a task for insertion: fresh id and creation time
pub(crate) fn prepare_insert(mut task: Task) -> Task {
    let now = now_ms();
    task.id = Uuid::now_v7().to_string();
    task.created_at = now;
    task.updated_at = now;
    task
}

/// Sort into listing order: pending first, then by completion and run time,
/// both descending
pub(crate) fn sort_for_listing(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| (Reverse(t.completed_at.unwrap_or(i64::MAX)), Reverse(t.run_at)));
}
