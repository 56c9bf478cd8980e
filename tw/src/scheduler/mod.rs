//! Scheduling of recurring and one-shot tasks
//!
//! The [`Scheduler`] owns the duplicate-suppression rules:
//! - a repeating task yields at most one pending occurrence per
//!   `(identity_hash, run_at)`
//! - a one-shot delayed task yields at most one pending task per
//!   `(handler, schedule_interval)`

mod core;
mod oneshot;
mod outcome;
mod recurrence;

pub use self::core::Scheduler;
pub use outcome::{ScheduleResult, SchedulerStats};
pub use recurrence::next_run_at;
