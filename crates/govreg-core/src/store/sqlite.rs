//! SQLite backend. Artifact bytes and metadata live in one row per
//! `(name, version)`; each public method opens its own connection.

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::expand_tilde;
use crate::errors::{GovResult, GovernanceError};
use crate::models::ModelMetadata;
use crate::store::schema;
use crate::store::{StorageBackend, StoredEntry};

fn sortable_timestamp(metadata: &ModelMetadata) -> String {
    metadata
        .created_date
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn metadata_json(metadata: &ModelMetadata) -> GovResult<String> {
    serde_json::to_string(metadata).map_err(|e| GovernanceError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// SqliteBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Open the database at `db_path`, creating parent directories and
    /// applying the schema.
    pub fn new(db_path: impl AsRef<Path>) -> GovResult<Self> {
        let expanded = expand_tilde(&db_path.as_ref().to_string_lossy());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let backend = Self { db_path: resolved };
        backend.init_schema()?;
        Ok(backend)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> GovResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// WAL mode, then the schema.
    pub fn init_schema(&self) -> GovResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        schema::apply_schema(&conn)
    }
}

impl StorageBackend for SqliteBackend {
    fn save(
        &self,
        name: &str,
        version: &str,
        artifact: &[u8],
        metadata: &ModelMetadata,
    ) -> GovResult<()> {
        let body = metadata_json(metadata)?;
        let checksum = crc32fast::hash(artifact) as i64;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO model_versions( \
                 name, version, created_date, status, metadata_json, artifact, artifact_crc32 \
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                name,
                version,
                sortable_timestamp(metadata),
                metadata.status.as_str(),
                body,
                artifact,
                checksum,
            ],
        )?;
        tracing::debug!(name, version, bytes = artifact.len(), "persisted model row");
        Ok(())
    }

    fn update_metadata(&self, metadata: &ModelMetadata) -> GovResult<()> {
        let body = metadata_json(metadata)?;
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE model_versions SET status = ?1, metadata_json = ?2 \
             WHERE name = ?3 AND version = ?4;",
            params![
                metadata.status.as_str(),
                body,
                metadata.name,
                metadata.version
            ],
        )?;
        if updated == 0 {
            return Err(GovernanceError::not_found_version(
                &metadata.name,
                &metadata.version,
            ));
        }
        Ok(())
    }

    fn load_artifact(&self, name: &str, version: &str) -> GovResult<Vec<u8>> {
        let conn = self.connect()?;
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT artifact, artifact_crc32 FROM model_versions \
                 WHERE name = ?1 AND version = ?2 LIMIT 1;",
                params![name, version],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (artifact, stored_crc) =
            row.ok_or_else(|| GovernanceError::not_found_version(name, version))?;
        if crc32fast::hash(&artifact) as i64 != stored_crc {
            return Err(GovernanceError::Validation(format!(
                "artifact checksum mismatch for {name}:{version}"
            )));
        }
        Ok(artifact)
    }

    fn enumerate(&self) -> GovResult<Vec<StoredEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name, version, metadata_json FROM model_versions \
             ORDER BY name ASC, created_date ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let version: String = row.get(1)?;
            let body: String = row.get(2)?;
            let metadata: ModelMetadata = serde_json::from_str(&body).map_err(|e| {
                GovernanceError::Validation(format!("corrupt metadata for {name}:{version}: {e}"))
            })?;
            entries.push(StoredEntry {
                name,
                version,
                metadata,
            });
        }
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }
}
