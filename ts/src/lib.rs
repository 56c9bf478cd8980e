//! TaskStore - generic persistent record storage
//!
//! Records are serialized to JSON and kept in a single SQLite table keyed by
//! `(collection, id)`. Each record also exposes a set of indexed fields which
//! are written to a side table so callers can query by field value without
//! deserializing every record.
//!
//! # Architecture
//!
//! ```text
//! {store_dir}/
//! └── taskstore.db
//!     ├── schema_meta      # schema version
//!     ├── records          # (collection, id) -> JSON
//!     └── record_indexes   # (collection, id, field) -> value
//! ```
//!
//! # Example
//!
//! ```ignore
//! use taskstore::{Filter, Store};
//!
//! let mut store = Store::open(".taskstore")?;
//! let id = store.create(record)?;
//! let pending: Vec<MyRecord> = store.list(&[Filter::is_null("completed_at")])?;
//! ```

mod error;
mod filter;
mod record;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use filter::{Filter, FilterOp, IndexValue};
pub use record::Record;
pub use schema::CURRENT_SCHEMA_VERSION;
pub use store::{Store, StoreOptions};

/// File name of the SQLite database inside a store directory
pub const DB_FILE_NAME: &str = "taskstore.db";

/// Default time a writer waits on a locked database (5s)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Current wall-clock time in Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
