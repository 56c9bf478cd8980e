//! Task domain type
//!
//! One unit of deferred work: a handler name plus JSON arguments, the time it
//! becomes eligible to run, and its lifecycle state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use taskstore::{IndexValue, Record, now_ms};
use tracing::debug;

use super::hash::{identity_hash_values, or_default_args, or_default_kwargs};
use crate::error::{WorkerError, WorkerResult};

/// Milliseconds per second, for converting interval seconds onto timestamps
pub const MS_PER_SEC: i64 = 1_000;

/// Task lifecycle status
///
/// `Waiting` is the only non-terminal state; a task moves once to
/// `Completed` or `Failed` and is never changed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Waiting,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Canonical repeat periods
///
/// `repeat_interval` is stored as plain seconds and any positive value is
/// valid; these are the named periods offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    Never,
    Hourly,
    Daily,
    Weekly,
    EveryTwoWeeks,
    EveryFourWeeks,
}

impl Repeat {
    pub const HOURLY: i64 = 3_600;
    pub const DAILY: i64 = 24 * Self::HOURLY;
    pub const WEEKLY: i64 = 7 * Self::DAILY;
    pub const EVERY_TWO_WEEKS: i64 = 2 * Self::WEEKLY;
    pub const EVERY_FOUR_WEEKS: i64 = 4 * Self::WEEKLY;
    pub const NEVER: i64 = 0;

    pub const ALL: [Repeat; 6] = [
        Self::Hourly,
        Self::Daily,
        Self::Weekly,
        Self::EveryTwoWeeks,
        Self::EveryFourWeeks,
        Self::Never,
    ];

    /// Interval in seconds
    pub fn secs(&self) -> i64 {
        match self {
            Self::Never => Self::NEVER,
            Self::Hourly => Self::HOURLY,
            Self::Daily => Self::DAILY,
            Self::Weekly => Self::WEEKLY,
            Self::EveryTwoWeeks => Self::EVERY_TWO_WEEKS,
            Self::EveryFourWeeks => Self::EVERY_FOUR_WEEKS,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::EveryTwoWeeks => "every 2 weeks",
            Self::EveryFourWeeks => "every 4 weeks",
        }
    }

    /// The named period for an interval, if it is a canonical one
    pub fn from_secs(secs: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.secs() == secs)
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Repeat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        Self::ALL
            .into_iter()
            .find(|r| r.label() == normalized)
            .ok_or_else(|| format!("unknown repeat period '{}'", s))
    }
}

/// A unit of deferred work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, assigned by the repository on insert
    #[serde(default)]
    pub id: String,

    /// Registry key of the work to perform
    pub handler: String,

    /// Positional arguments (JSON array)
    #[serde(default = "empty_args")]
    pub args: Value,

    /// Keyword arguments (JSON object)
    #[serde(default = "empty_kwargs")]
    pub kwargs: Value,

    /// Deduplication key derived from handler, args and kwargs
    pub identity_hash: String,

    /// Failure detail, empty unless status is Failed
    #[serde(default)]
    pub error: String,

    /// Delay in seconds for one-shot scheduled tasks
    #[serde(default)]
    pub schedule_interval: Option<i64>,

    /// Repeat period in seconds, 0 for never
    #[serde(default)]
    pub repeat_interval: i64,

    /// Earliest time the task may run (Unix milliseconds)
    pub run_at: i64,

    /// Creation timestamp (Unix milliseconds)
    #[serde(default)]
    pub created_at: i64,

    /// Set when the task leaves Waiting (Unix milliseconds)
    #[serde(default)]
    pub completed_at: Option<i64>,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Last update timestamp (Unix milliseconds)
    #[serde(default)]
    pub updated_at: i64,
}

fn empty_args() -> Value {
    Value::Array(Vec::new())
}

fn empty_kwargs() -> Value {
    Value::Object(Map::new())
}

impl Task {
    /// Create a waiting task eligible to run now
    ///
    /// Empty or falsy arguments (`null`, `false`, `0`, `""`, `[]`, `{}`) are
    /// normalized to `[]` / `{}`.
    pub fn new(handler: impl Into<String>, args: Value, kwargs: Value) -> WorkerResult<Self> {
        let handler = handler.into();
        debug!(%handler, "Task::new: called");
        let args = or_default_args(&args);
        let kwargs = or_default_kwargs(&kwargs);
        let identity_hash = identity_hash_values(&handler, &args, &kwargs)?;

        Ok(Self {
            id: String::new(),
            handler,
            args,
            kwargs,
            identity_hash,
            error: String::new(),
            schedule_interval: None,
            repeat_interval: Repeat::NEVER,
            run_at: now_ms(),
            created_at: 0,
            completed_at: None,
            status: TaskStatus::Waiting,
            updated_at: 0,
        })
    }

    /// Create a task without arguments
    pub fn bare(handler: impl Into<String>) -> WorkerResult<Self> {
        Self::new(handler, empty_args(), empty_kwargs())
    }

    /// Builder method to set the run time
    pub fn with_run_at(mut self, run_at: i64) -> Self {
        debug!(handler = %self.handler, run_at, "Task::with_run_at: called");
        self.run_at = run_at;
        self
    }

    /// Builder method to set the repeat period in seconds
    pub fn with_repeat(mut self, repeat_interval: i64) -> Self {
        debug!(handler = %self.handler, repeat_interval, "Task::with_repeat: called");
        self.repeat_interval = repeat_interval;
        self
    }

    /// Builder method to set the one-shot schedule interval in seconds
    pub fn with_schedule(mut self, schedule_interval: i64) -> Self {
        debug!(handler = %self.handler, schedule_interval, "Task::with_schedule: called");
        self.schedule_interval = Some(schedule_interval);
        self
    }

    /// Recompute the identity hash from the current handler and arguments
    pub fn compute_hash(&self) -> WorkerResult<String> {
        identity_hash_values(&self.handler, &self.args, &self.kwargs)
    }

    /// First six characters of the identity hash
    pub fn short_hash(&self) -> &str {
        let end = self
            .identity_hash
            .char_indices()
            .nth(6)
            .map(|(i, _)| i)
            .unwrap_or(self.identity_hash.len());
        &self.identity_hash[..end]
    }

    /// Compact description for log lines: `Task(handler=..., hash=abcdef)`
    pub fn summary(&self) -> String {
        format!("Task(handler={}, hash={})", self.handler, self.short_hash())
    }

    /// The canonical repeat period, if the interval is one
    pub fn repeat(&self) -> Option<Repeat> {
        Repeat::from_secs(self.repeat_interval)
    }

    pub fn repeats(&self) -> bool {
        self.repeat_interval > 0
    }

    /// Still waiting to run (not completed or failed)
    pub fn is_pending(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Waiting and eligible to run at `now`
    pub fn is_due(&self, now: i64) -> bool {
        self.status == TaskStatus::Waiting && self.run_at <= now
    }

    /// Mark the task completed at `at`
    pub fn complete(&mut self, at: i64) -> WorkerResult<()> {
        debug!(id = %self.id, ?self.status, "Task::complete: called");
        self.transition(TaskStatus::Completed, at)
    }

    /// Mark the task failed at `at` with an error message
    ///
    /// A blank message is replaced so a failed task always carries an error.
    pub fn fail(&mut self, at: i64, error: impl Into<String>) -> WorkerResult<()> {
        debug!(id = %self.id, ?self.status, "Task::fail: called");
        self.transition(TaskStatus::Failed, at)?;
        let error = error.into();
        self.error = if error.trim().is_empty() {
            "task failed without an error message".to_string()
        } else {
            error
        };
        Ok(())
    }

    fn transition(&mut self, to: TaskStatus, at: i64) -> WorkerResult<()> {
        if self.status.is_terminal() {
            debug!(id = %self.id, from = %self.status, %to, "Task::transition: rejected, already terminal");
            return Err(WorkerError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.completed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.handler)
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("handler".to_string(), IndexValue::String(self.handler.clone()));
        fields.insert(
            "identity_hash".to_string(),
            IndexValue::String(self.identity_hash.clone()),
        );
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("run_at".to_string(), IndexValue::Int(self.run_at));
        fields.insert("repeat_interval".to_string(), IndexValue::Int(self.repeat_interval));
        if let Some(schedule) = self.schedule_interval {
            fields.insert("schedule_interval".to_string(), IndexValue::Int(schedule));
        }
        if let Some(completed_at) = self.completed_at {
            fields.insert("completed_at".to_string(), IndexValue::Int(completed_at));
        }
        fields
    }
}
