//! Error types for task scheduling

use taskstore::StoreError;
use thiserror::Error;

use crate::domain::TaskStatus;

/// Errors from scheduling and repository operations
///
/// Duplicate scheduling is not an error; it is reported through
/// [`crate::scheduler::ScheduleResult::Duplicate`].
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: TaskStatus, to: TaskStatus },

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

/// Result alias for task operations
pub type WorkerResult<T> = Result<T, WorkerError>;
