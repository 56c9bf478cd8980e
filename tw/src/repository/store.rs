//! TaskStore-backed repository

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use taskstore::{Filter, FilterOp, Store, StoreOptions};
use tracing::{debug, info};

use super::{Repository, TaskQuery, already_settled, pending_guard, prepare_insert, sort_for_listing};
use crate::domain::{Task, TaskStatus};
use crate::error::{WorkerError, WorkerResult};

/// Repository persisting tasks in a TaskStore SQLite database
///
/// Duplicate guards run as a single `IMMEDIATE` transaction in the store, so
/// the guarantee holds across threads and across processes sharing the file.
pub struct StoreRepository {
    store: Mutex<Store>,
}

impl StoreRepository {
    /// Open (or create) the store in `path`
    pub fn open(path: impl AsRef<Path>) -> WorkerResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> WorkerResult<Self> {
        debug!(path = %path.as_ref().display(), "StoreRepository::open_with: called");
        let mut store = Store::open_with(path, options)?;
        let reindexed = store.rebuild_indexes::<Task>()?;
        info!(reindexed, "Rebuilt indexes for Task records");
        Ok(Self::from_store(store))
    }

    /// Private in-memory database
    pub fn in_memory() -> WorkerResult<Self> {
        Ok(Self::from_store(Store::open_in_memory()?))
    }

    pub fn from_store(store: Store) -> Self {
        Self { store: Mutex::new(store) }
    }

    fn lock(&self) -> WorkerResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| WorkerError::Repository("store lock poisoned".to_string()))
    }
}

impl Repository for StoreRepository {
    fn exists(&self, query: &TaskQuery) -> WorkerResult<bool> {
        Ok(self.lock()?.exists::<Task>(&query.to_filters())?)
    }

    fn find_one(&self, query: &TaskQuery) -> WorkerResult<Option<Task>> {
        let tasks: Vec<Task> = self.lock()?.list(&query.to_filters())?;
        Ok(tasks.into_iter().next())
    }

    fn insert(&self, task: Task) -> WorkerResult<Task> {
        let task = prepare_insert(task);
        debug!(id = %task.id, handler = %task.handler, "StoreRepository::insert: called");
        self.lock()?.create(task.clone())?;
        Ok(task)
    }

    fn insert_unless_exists(&self, query: &TaskQuery, task: Task) -> WorkerResult<Option<Task>> {
        let task = prepare_insert(task);
        debug!(id = %task.id, handler = %task.handler, "StoreRepository::insert_unless_exists: called");
        let created = self.lock()?.create_unless_exists(&query.to_filters(), task.clone())?;
        Ok(created.map(|_| task))
    }

    fn get(&self, id: &str) -> WorkerResult<Option<Task>> {
        Ok(self.lock()?.get(id)?)
    }

    fn update(&self, task: &Task) -> WorkerResult<()> {
        debug!(id = %task.id, status = %task.status, "StoreRepository::update: called");
        self.lock()?.update(task.clone()).map_err(|e| match e {
            taskstore::StoreError::NotFound { id, .. } => WorkerError::NotFound(id),
            other => other.into(),
        })
    }

    fn update_if_pending(&self, task: &Task) -> WorkerResult<()> {
        debug!(id = %task.id, status = %task.status, "StoreRepository::update_if_pending: called");
        let mut store = self.lock()?;
        let updated = store
            .update_if(&pending_guard().to_filters(), task.clone())
            .map_err(|e| match e {
                taskstore::StoreError::NotFound { id, .. } => WorkerError::NotFound(id),
                other => other.into(),
            })?;
        if updated {
            return Ok(());
        }
        let stored: Option<Task> = store.get(&task.id)?;
        let status = stored.map(|t| t.status).unwrap_or(task.status);
        debug!(id = %task.id, stored = %status, "StoreRepository::update_if_pending: already settled");
        Err(already_settled(task, status))
    }

    fn list(&self, query: &TaskQuery) -> WorkerResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.lock()?.list(&query.to_filters())?;
        sort_for_listing(&mut tasks);
        Ok(tasks)
    }

    fn list_due(&self, now: i64) -> WorkerResult<Vec<Task>> {
        let mut filters = TaskQuery::new().status(TaskStatus::Waiting).to_filters();
        filters.push(Filter::new("run_at", FilterOp::Le, now));
        let mut due: Vec<Task> = self.lock()?.list(&filters)?;
        due.sort_by_key(|t| t.run_at);
        Ok(due)
    }
}
