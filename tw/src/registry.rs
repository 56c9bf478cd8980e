//! HandlerRegistry - explicit name to handler lookup
//!
//! Handlers are registered by name at start-up and the registry is handed to
//! whatever runs due tasks. A task only stores the handler name; resolution
//! happens here at run time.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::domain::Task;
use crate::error::{WorkerError, WorkerResult};
use crate::scheduler::{ScheduleResult, Scheduler};

/// Outcome of a handler call; `Err` carries the message recorded on the task
pub type HandlerResult = Result<(), String>;

/// A task handler, called with the task's `(args, kwargs)`
pub type Handler = Box<dyn Fn(&Value, &Value) -> HandlerResult + Send + Sync>;

/// Maps handler names to callables
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, replacing any existing one
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Value, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(%name, "HandlerRegistry::register: called");
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            warn!(%name, "Replaced existing handler");
        }
    }

    /// Look up a handler by name
    pub fn get(&self, name: &str) -> WorkerResult<&Handler> {
        self.handlers
            .get(name)
            .ok_or_else(|| WorkerError::UnknownHandler(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Call the task's handler with its arguments
    ///
    /// The outer error is [`WorkerError::UnknownHandler`]; the inner result is
    /// whatever the handler returned.
    pub fn invoke(&self, task: &Task) -> WorkerResult<HandlerResult> {
        debug!(id = %task.id, handler = %task.handler, "HandlerRegistry::invoke: called");
        let handler = self.get(&task.handler)?;
        Ok(handler(&task.args, &task.kwargs))
    }

    /// Invoke a task and settle it with the outcome
    ///
    /// An unregistered handler is recorded as a task failure rather than
    /// returned, so the task does not stay waiting forever.
    pub fn run(&self, scheduler: &Scheduler, task: &mut Task, now: i64) -> WorkerResult<ScheduleResult> {
        debug!(id = %task.id, handler = %task.handler, now, "HandlerRegistry::run: called");
        let outcome = match self.invoke(task) {
            Ok(outcome) => outcome,
            Err(e @ WorkerError::UnknownHandler(_)) => {
                warn!(id = %task.id, handler = %task.handler, "No handler registered");
                Err(e.to_string())
            }
            Err(e) => return Err(e),
        };
        if let Err(error) = &outcome {
            warn!(id = %task.id, task = %task.summary(), %error, "Task failed");
        }
        scheduler.settle(task, outcome, now)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").field("handlers", &self.names()).finish()
    }
}
