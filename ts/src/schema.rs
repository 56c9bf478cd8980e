//! SQLite DDL and versioned schema migrations

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Schema version a freshly migrated database ends up at
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Ordered migrations; each entry brings the schema to `version`.
const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    data       TEXT NOT NULL,             -- JSON-serialized record
    updated_at INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (collection, id)
);

CREATE TABLE IF NOT EXISTS record_indexes (
    collection   TEXT NOT NULL,
    id           TEXT NOT NULL,
    field        TEXT NOT NULL,
    value_string TEXT,
    value_int    INTEGER,
    value_bool   INTEGER,
    PRIMARY KEY (collection, id, field)
);

CREATE INDEX IF NOT EXISTS idx_record_indexes_string
    ON record_indexes(collection, field, value_string);
"#,
    ),
    (
        2,
        r#"
CREATE INDEX IF NOT EXISTS idx_record_indexes_int
    ON record_indexes(collection, field, value_int);
CREATE INDEX IF NOT EXISTS idx_records_updated_at
    ON records(collection, updated_at);
"#,
    ),
];

/// Read the current schema version, `None` on a fresh database
pub(crate) fn read_schema_version(conn: &Connection) -> StoreResult<Option<u32>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|e| StoreError::Migration(format!("invalid schema_version '{}': {}", v, e))),
        None => Ok(None),
    }
}

/// Apply every pending migration inside one write transaction
///
/// The transaction takes the write lock up front so two processes opening the
/// same database concurrently cannot both apply a migration.
pub(crate) fn migrate(conn: &mut Connection) -> StoreResult<u32> {
    debug!("migrate: called");
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(META_SQL)?;

    let current = read_schema_version(&tx)?.unwrap_or(0);
    if current > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_SCHEMA_VERSION
        )));
    }

    let mut version = current;
    for (target, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        debug!(target, "migrate: applying migration");
        tx.execute_batch(sql)?;
        version = *target;
    }

    tx.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![version.to_string()],
    )?;
    tx.commit()?;

    if version != current {
        info!(from = current, to = version, "Migrated store schema");
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrate_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let version = migrate(&mut conn).unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);

        let tables = tables(&conn);
        assert!(tables.contains(&"records".to_string()));
        assert!(tables.contains(&"record_indexes".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_migrate_from_v1() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(META_SQL).unwrap();
        conn.execute_batch(MIGRATIONS[0].1).unwrap();
        conn.execute(
            "INSERT INTO schema_meta (key, value) VALUES ('schema_version', '1')",
            [],
        )
        .unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), 2);
        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='idx_record_indexes_int'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 1);
    }

    #[test]
    fn test_migrate_rejects_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute("UPDATE schema_meta SET value = '999' WHERE key = 'schema_version'", [])
            .unwrap();

        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::Migration(_)));
    }
}
