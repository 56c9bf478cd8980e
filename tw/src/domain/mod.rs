//! Domain types for TaskWorkers
//!
//! Core domain types: Task, TaskStatus, Repeat and the identity hash.
//! Task implements the Record trait for TaskStore persistence.

mod hash;
mod task;

pub use hash::{IDENTITY_HASH_LEN, canonical_json, identity_hash, identity_hash_values, is_identity_hash};
pub use task::{MS_PER_SEC, Repeat, Task, TaskStatus};

// Re-export taskstore types for convenience
pub use taskstore::{Filter, FilterOp, IndexValue, Record, Store, now_ms};
