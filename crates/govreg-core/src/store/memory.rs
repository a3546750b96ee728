//! Process-local backend. Nothing survives the process; useful where no
//! durable store is configured and in tests.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::errors::{GovResult, GovernanceError};
use crate::models::ModelMetadata;
use crate::store::{StorageBackend, StoredEntry};

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: Mutex<IndexMap<(String, String), (Vec<u8>, ModelMetadata)>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StorageBackend for InMemoryBackend {
    fn save(
        &self,
        name: &str,
        version: &str,
        artifact: &[u8],
        metadata: &ModelMetadata,
    ) -> GovResult<()> {
        self.entries.lock().insert(
            (name.to_string(), version.to_string()),
            (artifact.to_vec(), metadata.clone()),
        );
        Ok(())
    }

    fn update_metadata(&self, metadata: &ModelMetadata) -> GovResult<()> {
        let mut entries = self.entries.lock();
        let key = (metadata.name.clone(), metadata.version.clone());
        match entries.get_mut(&key) {
            Some((_, stored)) => {
                *stored = metadata.clone();
                Ok(())
            }
            None => Err(GovernanceError::not_found_version(
                &metadata.name,
                &metadata.version,
            )),
        }
    }

    fn load_artifact(&self, name: &str, version: &str) -> GovResult<Vec<u8>> {
        self.entries
            .lock()
            .get(&(name.to_string(), version.to_string()))
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| GovernanceError::not_found_version(name, version))
    }

    fn enumerate(&self) -> GovResult<Vec<StoredEntry>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|((name, version), (_, metadata))| StoredEntry {
                name: name.clone(),
                version: version.clone(),
                metadata: metadata.clone(),
            })
            .collect())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
