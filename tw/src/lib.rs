//! TaskWorkers - persisted task scheduling core
//!
//! Tasks are units of deferred work identified by a handler name plus JSON
//! arguments. This crate decides *when* and *whether* a task record is
//! created; running handlers is left to the caller.
//!
//! - [`domain`]: `Task`, its lifecycle and the canonical identity hash
//! - [`repository`]: storage trait with in-memory and TaskStore backends
//! - [`scheduler`]: recurrence and one-shot scheduling with duplicate suppression
//! - [`registry`]: explicit handler registration and invocation
//! - [`migration`]: data migrations over stored tasks

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod migration;
pub mod registry;
pub mod repository;
pub mod scheduler;

pub use config::Config;
pub use domain::{MS_PER_SEC, Repeat, Task, TaskStatus, identity_hash, identity_hash_values, now_ms};
pub use error::{WorkerError, WorkerResult};
pub use migration::rehash_tasks;
pub use registry::{Handler, HandlerRegistry, HandlerResult};
pub use repository::{MemoryRepository, Repository, StoreRepository, TaskQuery};
pub use scheduler::{ScheduleResult, Scheduler, SchedulerStats, next_run_at};
