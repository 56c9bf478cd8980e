//! Core Store implementation

use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params, params_from_iter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, IndexValue};
use crate::record::Record;
use crate::schema;

/// Options for opening a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a writer waits for the database lock before failing
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(crate::DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

/// SQLite-backed record store
pub struct Store {
    conn: Connection,
    /// Database file path, `None` for in-memory stores
    db_path: Option<PathBuf>,
}

impl Store {
    /// Open or create a store in the given directory
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open or create a store in the given directory with explicit options
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let dir = path.as_ref();
        debug!(dir = %dir.display(), "Store::open_with: called");
        fs::create_dir_all(dir)?;
        let db_path = dir.join(crate::DB_FILE_NAME);

        let mut conn = Connection::open(&db_path)?;
        conn.busy_timeout(options.busy_timeout)?;
        let journal_mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(%journal_mode, "Store::open_with: journal mode set");
        let version = schema::migrate(&mut conn)?;

        info!(db_path = %db_path.display(), version, "Opened task store");
        Ok(Self {
            conn,
            db_path: Some(db_path),
        })
    }

    /// Open a private in-memory store (tests, dry runs)
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("Store::open_in_memory: called");
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn, db_path: None })
    }

    /// Path of the backing database file
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Current schema version of the backing database
    pub fn schema_version(&self) -> StoreResult<u32> {
        Ok(schema::read_schema_version(&self.conn)?.unwrap_or(0))
    }

    /// Insert a new record, returning its id
    pub fn create<T: Record>(&mut self, record: T) -> StoreResult<String> {
        debug!(collection = T::collection_name(), id = record.id(), "Store::create: called");
        let tx = self.conn.transaction()?;
        insert_record(&tx, &record)?;
        tx.commit()?;
        Ok(record.id().to_string())
    }

    /// Insert a record only if no record of its collection matches `filters`
    ///
    /// The check and the insert run in one `IMMEDIATE` transaction, so the
    /// database write lock is held from before the check until the commit.
    /// Returns the new id, or `None` when a matching record already exists.
    pub fn create_unless_exists<T: Record>(&mut self, filters: &[Filter], record: T) -> StoreResult<Option<String>> {
        debug!(
            collection = T::collection_name(),
            id = record.id(),
            ?filters,
            "Store::create_unless_exists: called"
        );
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = query_ids(&tx, T::collection_name(), filters, Some(1))?;
        if !existing.is_empty() {
            debug!(existing = %existing[0], "Store::create_unless_exists: match found, skipping insert");
            tx.commit()?;
            return Ok(None);
        }
        insert_record(&tx, &record)?;
        tx.commit()?;
        Ok(Some(record.id().to_string()))
    }

    /// Get a record by id
    pub fn get<T: Record>(&self, id: &str) -> StoreResult<Option<T>> {
        debug!(collection = T::collection_name(), %id, "Store::get: called");
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![T::collection_name(), id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Replace an existing record and its indexes
    pub fn update<T: Record>(&mut self, record: T) -> StoreResult<()> {
        debug!(collection = T::collection_name(), id = record.id(), "Store::update: called");
        let tx = self.conn.transaction()?;
        replace_record(&tx, &record)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace a record only while the stored copy still matches `filters`
    ///
    /// Runs in one `IMMEDIATE` transaction like [`Store::create_unless_exists`].
    /// Returns `false`, leaving the stored copy untouched, when it no longer
    /// matches; `NotFound` when there is no record with this id.
    pub fn update_if<T: Record>(&mut self, filters: &[Filter], record: T) -> StoreResult<bool> {
        debug!(
            collection = T::collection_name(),
            id = record.id(),
            ?filters,
            "Store::update_if: called"
        );
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !record_matches(&tx, T::collection_name(), record.id(), filters)? {
            let present: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM records WHERE collection = ?1 AND id = ?2",
                    params![T::collection_name(), record.id()],
                    |row| row.get(0),
                )
                .optional()?;
            tx.commit()?;
            if present.is_none() {
                return Err(StoreError::NotFound {
                    collection: T::collection_name().to_string(),
                    id: record.id().to_string(),
                });
            }
            debug!(id = record.id(), "Store::update_if: stored copy no longer matches, skipping update");
            return Ok(false);
        }
        replace_record(&tx, &record)?;
        tx.commit()?;
        Ok(true)
    }

    /// Delete a record by id, returning whether it existed
    pub fn delete<T: Record>(&mut self, id: &str) -> StoreResult<bool> {
        debug!(collection = T::collection_name(), %id, "Store::delete: called");
        let tx = self.conn.transaction()?;
        let removed = delete_ids(&tx, T::collection_name(), &[id.to_string()])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Delete every record whose indexed `field` equals `value`
    pub fn delete_by_index<T: Record>(&mut self, field: &str, value: IndexValue) -> StoreResult<usize> {
        debug!(collection = T::collection_name(), %field, ?value, "Store::delete_by_index: called");
        let tx = self.conn.transaction()?;
        let ids = query_ids(&tx, T::collection_name(), &[Filter::eq(field, value)], None)?;
        let removed = delete_ids(&tx, T::collection_name(), &ids)?;
        tx.commit()?;
        Ok(removed)
    }

    /// List records matching all filters, in insertion order
    pub fn list<T: Record>(&self, filters: &[Filter]) -> StoreResult<Vec<T>> {
        debug!(collection = T::collection_name(), ?filters, "Store::list: called");
        load_records(&self.conn, filters)
    }

    /// Whether any record matches all filters
    pub fn exists<T: Record>(&self, filters: &[Filter]) -> StoreResult<bool> {
        debug!(collection = T::collection_name(), ?filters, "Store::exists: called");
        Ok(!query_ids(&self.conn, T::collection_name(), filters, Some(1))?.is_empty())
    }

    /// Recompute the index rows of every record in the collection
    pub fn rebuild_indexes<T: Record>(&mut self) -> StoreResult<usize> {
        debug!(collection = T::collection_name(), "Store::rebuild_indexes: called");
        // read and rewrite under one write lock so a concurrent update is not clobbered
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let records: Vec<T> = load_records(&tx, &[])?;
        for record in &records {
            write_indexes(&tx, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }
}

fn insert_record<T: Record>(conn: &Connection, record: &T) -> StoreResult<()> {
    let data = serde_json::to_string(record)?;
    let result = conn.execute(
        "INSERT INTO records (collection, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![T::collection_name(), record.id(), data, record.updated_at()],
    );
    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Err(StoreError::AlreadyExists {
                collection: T::collection_name().to_string(),
                id: record.id().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    }
    write_indexes(conn, record)
}

fn replace_record<T: Record>(conn: &Connection, record: &T) -> StoreResult<()> {
    let data = serde_json::to_string(record)?;
    let changed = conn.execute(
        "UPDATE records SET data = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
        params![data, record.updated_at(), T::collection_name(), record.id()],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            collection: T::collection_name().to_string(),
            id: record.id().to_string(),
        });
    }
    write_indexes(conn, record)
}

fn record_matches(conn: &Connection, collection: &str, id: &str, filters: &[Filter]) -> StoreResult<bool> {
    let (where_sql, mut values) = build_where(collection, filters);
    values.push(Value::Text(id.to_string()));
    let sql = format!("SELECT 1 FROM records r WHERE {} AND r.id = ? LIMIT 1", where_sql);
    let found: Option<i64> = conn
        .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn load_records<T: Record>(conn: &Connection, filters: &[Filter]) -> StoreResult<Vec<T>> {
    let (where_sql, values) = build_where(T::collection_name(), filters);
    let sql = format!("SELECT r.data FROM records r WHERE {} ORDER BY r.rowid", where_sql);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(serde_json::from_str(&row?)?);
    }
    Ok(records)
}

fn write_indexes<T: Record>(conn: &Connection, record: &T) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
        params![T::collection_name(), record.id()],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO record_indexes (collection, id, field, value_string, value_int, value_bool)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (field, value) in record.indexed_fields() {
        let (string, int, boolean) = match value {
            IndexValue::String(s) => (Some(s), None, None),
            IndexValue::Int(i) => (None, Some(i), None),
            IndexValue::Bool(b) => (None, None, Some(b)),
        };
        stmt.execute(params![T::collection_name(), record.id(), field, string, int, boolean])?;
    }
    Ok(())
}

fn build_where(collection: &str, filters: &[Filter]) -> (String, Vec<Value>) {
    let mut values = vec![Value::Text(collection.to_string())];
    let mut clauses = vec!["r.collection = ?".to_string()];
    for filter in filters {
        clauses.push(filter.to_sql(&mut values));
    }
    (clauses.join(" AND "), values)
}

fn query_ids(conn: &Connection, collection: &str, filters: &[Filter], limit: Option<usize>) -> StoreResult<Vec<String>> {
    let (where_sql, values) = build_where(collection, filters);
    let mut sql = format!("SELECT r.id FROM records r WHERE {} ORDER BY r.rowid", where_sql);
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn delete_ids(conn: &Connection, collection: &str, ids: &[String]) -> StoreResult<usize> {
    let mut removed = 0;
    for id in ids {
        conn.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        removed += conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
    }
    Ok(removed)
}
