//! In-memory repository

use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{Repository, TaskQuery, already_settled, pending_guard, prepare_insert, sort_for_listing};
use crate::domain::Task;
use crate::error::{WorkerError, WorkerResult};

/// Repository keeping tasks in a mutex-guarded vector
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks
    pub fn len(&self) -> usize {
        self.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> WorkerResult<MutexGuard<'_, Vec<Task>>> {
        self.tasks
            .lock()
            .map_err(|_| WorkerError::Repository("memory repository lock poisoned".to_string()))
    }
}

impl Repository for MemoryRepository {
    fn exists(&self, query: &TaskQuery) -> WorkerResult<bool> {
        Ok(self.lock()?.iter().any(|t| query.matches(t)))
    }

    fn find_one(&self, query: &TaskQuery) -> WorkerResult<Option<Task>> {
        Ok(self.lock()?.iter().find(|t| query.matches(t)).cloned())
    }

    fn insert(&self, task: Task) -> WorkerResult<Task> {
        let task = prepare_insert(task);
        debug!(id = %task.id, handler = %task.handler, "MemoryRepository::insert: called");
        self.lock()?.push(task.clone());
        Ok(task)
    }

    fn insert_unless_exists(&self, query: &TaskQuery, task: Task) -> WorkerResult<Option<Task>> {
        let mut tasks = self.lock()?;
        if tasks.iter().any(|t| query.matches(t)) {
            debug!(handler = %task.handler, "MemoryRepository::insert_unless_exists: match found");
            return Ok(None);
        }
        let task = prepare_insert(task);
        tasks.push(task.clone());
        Ok(Some(task))
    }

    fn get(&self, id: &str) -> WorkerResult<Option<Task>> {
        Ok(self.lock()?.iter().find(|t| t.id == id).cloned())
    }

    fn update(&self, task: &Task) -> WorkerResult<()> {
        let mut tasks = self.lock()?;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| WorkerError::NotFound(task.id.clone()))?;
        *slot = task.clone();
        Ok(())
    }

    fn update_if_pending(&self, task: &Task) -> WorkerResult<()> {
        let mut tasks = self.lock()?;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| WorkerError::NotFound(task.id.clone()))?;
        if !pending_guard().matches(slot) {
            debug!(id = %task.id, stored = %slot.status, "MemoryRepository::update_if_pending: already settled");
            return Err(already_settled(task, slot.status));
        }
        *slot = task.clone();
        Ok(())
    }

    fn list(&self, query: &TaskQuery) -> WorkerResult<Vec<Task>> {
        let mut matching: Vec<Task> = self.lock()?.iter().filter(|t| query.matches(t)).cloned().collect();
        sort_for_listing(&mut matching);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;

    #[test]
    fn test_insert_and_get() {
        let repo = MemoryRepository::new();
        let stored = repo.insert(Task::bare("job").unwrap()).unwrap();
        assert_eq!(repo.get(&stored.id).unwrap(), Some(stored));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_insert_unless_exists() {
        let repo = MemoryRepository::new();
        let query = TaskQuery::new().handler("job").pending();

        assert!(repo.insert_unless_exists(&query, Task::bare("job").unwrap()).unwrap().is_some());
        assert!(repo.insert_unless_exists(&query, Task::bare("job").unwrap()).unwrap().is_none());
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_stale_copies_settle_once() {
        let repo = MemoryRepository::new();
        let stored = repo.insert(Task::bare("job").unwrap()).unwrap();
        let mut first = stored.clone();
        let mut second = stored.clone();

        first.complete(10).unwrap();
        repo.update_if_pending(&first).unwrap();

        second.fail(20, "late").unwrap();
        let err = repo.update_if_pending(&second).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Failed,
                ..
            }
        ));

        let now = repo.get(&stored.id).unwrap().unwrap();
        assert_eq!(now.status, TaskStatus::Completed);
        assert_eq!(now.completed_at, Some(10));
        assert!(now.error.is_empty());
    }

    #[test]
    fn test_update_missing_task() {
        let repo = MemoryRepository::new();
        let mut task = Task::bare("job").unwrap();
        task.id = "ghost".to_string();
        assert!(matches!(repo.update(&task), Err(WorkerError::NotFound(_))));
    }
}
