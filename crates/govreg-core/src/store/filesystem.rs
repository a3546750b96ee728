//! Filesystem backend: one directory per `(name, version)`.
//!
//! ```text
//! <root>/<name>/<version>/model.bin
//! <root>/<name>/<version>/metadata.json
//! ```
//!
//! `model.bin` is written first and `metadata.json` last (via temp file and
//! rename), so enumeration only ever sees complete entries.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::expand_tilde;
use crate::errors::{ErrorKind, GovResult, GovernanceError};
use crate::hashing::hash_file;
use crate::models::ModelMetadata;
use crate::store::{StorageBackend, StoredEntry};

pub const ARTIFACT_FILE: &str = "model.bin";
pub const METADATA_FILE: &str = "metadata.json";
const METADATA_TMP_FILE: &str = "metadata.json.tmp";

fn storage_err(action: &str, path: &Path, err: std::io::Error) -> GovernanceError {
    GovernanceError::Storage(format!("{action} {}: {err}", path.display()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> GovResult<()> {
    let mut file = fs::File::create(path).map_err(|e| storage_err("creating", path, e))?;
    file.write_all(bytes)
        .map_err(|e| storage_err("writing", path, e))?;
    file.sync_all().map_err(|e| storage_err("syncing", path, e))?;
    Ok(())
}

fn read_metadata(path: &Path) -> GovResult<ModelMetadata> {
    let raw = fs::read(path).map_err(|e| storage_err("reading", path, e))?;
    serde_json::from_slice(&raw).map_err(|e| {
        GovernanceError::Validation(format!("corrupt metadata {}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// FilesystemBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Open (creating if needed) a storage root. A leading `~` is expanded.
    pub fn new(root: impl AsRef<Path>) -> GovResult<Self> {
        let root = expand_tilde(&root.as_ref().to_string_lossy());
        fs::create_dir_all(&root).map_err(|e| storage_err("creating", &root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(name).join(version)
    }

    fn write_metadata(dir: &Path, metadata: &ModelMetadata) -> GovResult<()> {
        let body = serde_json::to_vec_pretty(metadata)
            .map_err(|e| GovernanceError::Serialization(e.to_string()))?;
        let tmp = dir.join(METADATA_TMP_FILE);
        write_synced(&tmp, &body)?;
        let target = dir.join(METADATA_FILE);
        fs::rename(&tmp, &target).map_err(|e| storage_err("renaming", &target, e))?;
        Ok(())
    }

    fn load_entry(dir: &Path) -> GovResult<StoredEntry> {
        let version = dir.file_name().and_then(|s| s.to_str());
        let name = dir
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str());
        let (name, version) = match (name, version) {
            (Some(n), Some(v)) => (n.to_string(), v.to_string()),
            _ => {
                return Err(GovernanceError::Validation(format!(
                    "non UTF-8 registry path {}",
                    dir.display()
                )))
            }
        };
        let metadata = read_metadata(&dir.join(METADATA_FILE))?;
        if metadata.name != name || metadata.version != version {
            return Err(GovernanceError::Validation(format!(
                "metadata in {} describes {}:{}",
                dir.display(),
                metadata.name,
                metadata.version
            )));
        }
        Ok(StoredEntry {
            name,
            version,
            metadata,
        })
    }
}

impl StorageBackend for FilesystemBackend {
    fn save(
        &self,
        name: &str,
        version: &str,
        artifact: &[u8],
        metadata: &ModelMetadata,
    ) -> GovResult<()> {
        let dir = self.version_dir(name, version);
        fs::create_dir_all(&dir).map_err(|e| storage_err("creating", &dir, e))?;
        write_synced(&dir.join(ARTIFACT_FILE), artifact)?;
        Self::write_metadata(&dir, metadata)?;
        tracing::debug!(
            path = %dir.display(),
            bytes = artifact.len(),
            "persisted model artifact"
        );
        Ok(())
    }

    fn update_metadata(&self, metadata: &ModelMetadata) -> GovResult<()> {
        let dir = self.version_dir(&metadata.name, &metadata.version);
        if !dir.join(METADATA_FILE).is_file() {
            return Err(GovernanceError::not_found_version(
                &metadata.name,
                &metadata.version,
            ));
        }
        Self::write_metadata(&dir, metadata)
    }

    fn load_artifact(&self, name: &str, version: &str) -> GovResult<Vec<u8>> {
        let path = self.version_dir(name, version).join(ARTIFACT_FILE);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GovernanceError::not_found_version(name, version))
            }
            Err(e) => Err(storage_err("reading", &path, e)),
        }
    }

    /// Streams `model.bin` instead of loading it whole.
    fn artifact_sha256(&self, name: &str, version: &str) -> GovResult<String> {
        let path = self.version_dir(name, version).join(ARTIFACT_FILE);
        hash_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GovernanceError::not_found_version(name, version),
            _ => e,
        })
    }

    fn enumerate(&self) -> GovResult<Vec<StoredEntry>> {
        let mut version_dirs: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                GovernanceError::Storage(format!("walking {}: {e}", self.root.display()))
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.path().join(METADATA_FILE).is_file() {
                version_dirs.push(entry.into_path());
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping incomplete entry");
            }
        }

        version_dirs
            .par_iter()
            .map(|dir| Self::load_entry(dir))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }
}
