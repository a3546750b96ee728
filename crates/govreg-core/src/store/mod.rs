//! Durable storage backends for registered artifacts and their metadata.
//!
//! The registry only talks to [`StorageBackend`]; the filesystem layout is the
//! default, SQLite and in-memory stores plug in behind the same trait.

use std::sync::Arc;

use crate::errors::GovResult;
use crate::hashing::sha256_hex;
use crate::models::ModelMetadata;

pub mod filesystem;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use filesystem::FilesystemBackend;
pub use memory::InMemoryBackend;
pub use sqlite::SqliteBackend;

/// One persisted entry surfaced during startup replay.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub name: String,
    pub version: String,
    pub metadata: ModelMetadata,
}

/// Persistence capability the registry delegates to.
pub trait StorageBackend: Send + Sync {
    /// Persist artifact bytes and metadata for `(name, version)` as two
    /// separate units.
    fn save(
        &self,
        name: &str,
        version: &str,
        artifact: &[u8],
        metadata: &ModelMetadata,
    ) -> GovResult<()>;

    /// Rewrite the metadata of an existing entry. The artifact is untouched.
    fn update_metadata(&self, metadata: &ModelMetadata) -> GovResult<()>;

    /// Load artifact bytes; `NotFound` when the entry does not exist.
    fn load_artifact(&self, name: &str, version: &str) -> GovResult<Vec<u8>>;

    /// SHA-256 of the stored artifact bytes.
    fn artifact_sha256(&self, name: &str, version: &str) -> GovResult<String> {
        Ok(sha256_hex(&self.load_artifact(name, version)?))
    }

    /// Every persisted entry, in a stable backend-defined order.
    fn enumerate(&self) -> GovResult<Vec<StoredEntry>>;

    /// Short human-readable label used in log lines.
    fn describe(&self) -> String;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn save(
        &self,
        name: &str,
        version: &str,
        artifact: &[u8],
        metadata: &ModelMetadata,
    ) -> GovResult<()> {
        (**self).save(name, version, artifact, metadata)
    }

    fn update_metadata(&self, metadata: &ModelMetadata) -> GovResult<()> {
        (**self).update_metadata(metadata)
    }

    fn load_artifact(&self, name: &str, version: &str) -> GovResult<Vec<u8>> {
        (**self).load_artifact(name, version)
    }

    fn artifact_sha256(&self, name: &str, version: &str) -> GovResult<String> {
        (**self).artifact_sha256(name, version)
    }

    fn enumerate(&self) -> GovResult<Vec<StoredEntry>> {
        (**self).enumerate()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
