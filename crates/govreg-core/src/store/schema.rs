//! SQLite schema for [`SqliteBackend`].
//!
//! The layout is stamped into `registry_meta` so a database written by a
//! newer build is refused instead of being read with the wrong layout.
//!
//! [`SqliteBackend`]: crate::store::sqlite::SqliteBackend

use rusqlite::Connection;

use crate::errors::{GovResult, GovernanceError};

pub const SCHEMA_VERSION: i32 = 1;

/// Idempotent DDL: every statement is `IF NOT EXISTS`.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS registry_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS model_versions (
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        created_date TEXT NOT NULL,
        status TEXT NOT NULL,
        metadata_json TEXT NOT NULL,
        artifact BLOB NOT NULL,
        artifact_crc32 INTEGER NOT NULL,
        saved_at TEXT DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(name, version)
    );",
    "CREATE INDEX IF NOT EXISTS idx_model_versions_created \
         ON model_versions(name, created_date);",
    "CREATE INDEX IF NOT EXISTS idx_model_versions_status \
         ON model_versions(name, status);",
];

/// Create missing tables and indexes and stamp [`SCHEMA_VERSION`], all in
/// one transaction.
pub fn apply_schema(conn: &Connection) -> GovResult<()> {
    let found = get_schema_version(conn);
    if found > SCHEMA_VERSION {
        return Err(GovernanceError::Validation(format!(
            "registry database uses schema v{found}, this build supports up to v{SCHEMA_VERSION}"
        )));
    }

    let tx = conn.unchecked_transaction()?;
    for stmt in SCHEMA_STATEMENTS {
        tx.execute_batch(stmt)?;
    }
    tx.execute(
        "INSERT INTO registry_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;

    if found < SCHEMA_VERSION {
        tracing::debug!(from = found, to = SCHEMA_VERSION, "stamped registry schema");
    }
    Ok(())
}

/// Version stamped in `registry_meta`; 0 for an uninitialised database.
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT value FROM registry_meta WHERE key = 'schema_version';",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse::<i32>().ok())
    .unwrap_or(0)
}
