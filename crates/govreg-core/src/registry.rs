//! Model registry: the in-memory governance index over a storage backend.
//!
//! The index maps each model name to its versions in version order. It is
//! rebuilt from [`StorageBackend::enumerate`] at construction, sorted by
//! `created_date` rather than by enumeration order.
//!
//! Mutations are serialized by a writer lock. Each one reads the index,
//! persists through the backend, then applies every in-memory change under a
//! single write guard, so readers never observe a half-applied promotion and
//! never wait on backend I/O.

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::artifact::Artifact;
use crate::errors::{GovResult, GovernanceError};
use crate::guards;
use crate::hashing::sha256_hex;
use crate::models::{
    LoadedModel, MetadataOverrides, ModelFilter, ModelMetadata, ModelStatus, DEFAULT_DOMAIN,
};
use crate::store::{StorageBackend, StoredEntry};

/// Result of a successful promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub promoted: ModelMetadata,
    /// Versions moved from `production` to `staging` by this promotion.
    pub demoted: Vec<String>,
}

// ---------------------------------------------------------------------------
// Index helpers
// ---------------------------------------------------------------------------

fn version_sequence(metadata: &ModelMetadata) -> u32 {
    guards::parse_version_tag(&metadata.version).unwrap_or(0)
}

/// Next sequence number for a model. Never lower than `len + 1`, and always
/// past the highest tag seen so gaps in persisted state are not refilled.
fn next_sequence(versions: &[ModelMetadata]) -> u32 {
    let highest = versions.iter().map(version_sequence).max().unwrap_or(0);
    highest.max(versions.len() as u32) + 1
}

/// Copies of every production record other than `keep`, set to staging.
fn demotions(versions: &[ModelMetadata], keep: &str) -> Vec<ModelMetadata> {
    versions
        .iter()
        .filter(|m| m.is_production() && m.version != keep)
        .map(|m| {
            let mut demoted = m.clone();
            demoted.status = ModelStatus::Staging;
            demoted
        })
        .collect()
}

/// Replace records in `versions` by version tag.
fn apply_updates(versions: &mut [ModelMetadata], updates: &[ModelMetadata]) {
    for record in versions.iter_mut() {
        if let Some(update) = updates.iter().find(|u| u.version == record.version) {
            *record = update.clone();
        }
    }
}

fn build_index(entries: Vec<StoredEntry>) -> IndexMap<String, Vec<ModelMetadata>> {
    let mut index: IndexMap<String, Vec<ModelMetadata>> = IndexMap::new();
    for entry in entries {
        index.entry(entry.name).or_default().push(entry.metadata);
    }

    for (name, versions) in index.iter_mut() {
        versions.sort_by(|a, b| {
            a.created_date
                .cmp(&b.created_date)
                .then_with(|| version_sequence(a).cmp(&version_sequence(b)))
        });

        // A crash between writes can leave several production records on
        // disk; the latest one wins.
        if let Some(keep) = versions.iter().rev().find(|m| m.is_production()) {
            let keep = keep.version.clone();
            let demoted = demotions(versions, &keep);
            if !demoted.is_empty() {
                tracing::warn!(
                    name = %name,
                    kept = %keep,
                    demoted = demoted.len(),
                    "multiple production versions persisted; demoting older ones to staging"
                );
                apply_updates(versions, &demoted);
            }
        }
    }
    index
}

// ---------------------------------------------------------------------------
// ModelRegistry
// ---------------------------------------------------------------------------

pub struct ModelRegistry {
    backend: Box<dyn StorageBackend>,
    models: RwLock<IndexMap<String, Vec<ModelMetadata>>>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("backend", &self.backend.describe())
            .field("models", &self.models.read().len())
            .finish()
    }
}

impl ModelRegistry {
    /// Build a registry over `backend`, replaying every persisted entry.
    pub fn new<B: StorageBackend + 'static>(backend: B) -> GovResult<Self> {
        Self::with_backend(Box::new(backend))
    }

    pub fn with_backend(backend: Box<dyn StorageBackend>) -> GovResult<Self> {
        let entries = backend.enumerate()?;
        let loaded = entries.len();
        let models = build_index(entries);
        tracing::info!(
            backend = %backend.describe(),
            models = models.len(),
            versions = loaded,
            "loaded model registry"
        );
        Ok(Self {
            backend,
            models: RwLock::new(models),
            writer: Mutex::new(()),
        })
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a new version of `name`.
    ///
    /// The artifact is serialized once; those bytes are hashed into
    /// `model_sha256` and handed to the backend. Any failure is returned as
    /// [`GovernanceError::Registration`] and consumes no version number.
    pub fn register<A: Artifact>(
        &self,
        name: &str,
        artifact: &A,
        model_type: &str,
        created_by: &str,
        overrides: Option<MetadataOverrides>,
    ) -> GovResult<ModelMetadata> {
        let _writer = self.writer.lock();

        let (version, demoted) = {
            let models = self.models.read();
            let existing = models.get(name).map(Vec::as_slice).unwrap_or(&[]);
            let version = guards::version_tag(next_sequence(existing));
            let wants_production = overrides
                .as_ref()
                .and_then(|o| o.status)
                .is_some_and(|s| s == ModelStatus::Production);
            let demoted = if wants_production {
                demotions(existing, &version)
            } else {
                Vec::new()
            };
            (version, demoted)
        };

        let metadata = match self.persist_new(
            name,
            &version,
            artifact,
            model_type,
            created_by,
            overrides.unwrap_or_default(),
        ) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::error!(name, version = %version, error = %e, "failed to register model");
                return Err(GovernanceError::registration(name, &version, e));
            }
        };

        // The new record is already durable and is the latest production
        // record, so a failed demotion write is repaired on the next reload.
        for record in &demoted {
            if let Err(e) = self.backend.update_metadata(record) {
                tracing::error!(
                    name,
                    version = %record.version,
                    error = %e,
                    "failed to persist demotion"
                );
            }
        }

        {
            let mut models = self.models.write();
            let versions = models.entry(name.to_string()).or_default();
            apply_updates(versions, &demoted);
            versions.push(metadata.clone());
        }

        tracing::info!(
            name,
            version = %metadata.version,
            created_by,
            status = %metadata.status,
            "registered model"
        );
        Ok(metadata)
    }

    fn persist_new<A: Artifact>(
        &self,
        name: &str,
        version: &str,
        artifact: &A,
        model_type: &str,
        created_by: &str,
        overrides: MetadataOverrides,
    ) -> GovResult<ModelMetadata> {
        guards::validate_model_name(name)?;
        if let Some(metrics) = &overrides.performance_metrics {
            guards::validate_metrics(metrics)?;
        }
        let bytes = artifact.to_bytes()?;

        let metadata = ModelMetadata {
            name: name.to_string(),
            version: version.to_string(),
            model_type: model_type.to_string(),
            domain: overrides
                .domain
                .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
            created_date: Utc::now(),
            created_by: created_by.to_string(),
            approval_date: overrides.approval_date,
            approved_by: overrides.approved_by,
            status: overrides.status.unwrap_or_default(),
            performance_metrics: overrides.performance_metrics,
            validation_report: overrides.validation_report,
            data_sha256: overrides.data_sha256,
            model_sha256: Some(sha256_hex(&bytes)),
        };

        self.backend.save(name, version, &bytes, &metadata)?;
        Ok(metadata)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Metadata of the current production version of `name`, if any.
    pub fn production_metadata(&self, name: &str) -> Option<ModelMetadata> {
        let models = self.models.read();
        models
            .get(name)?
            .iter()
            .filter(|m| m.is_production())
            // max_by_key keeps the last maximum: ties go to the later registration
            .max_by_key(|m| m.created_date)
            .cloned()
    }

    pub fn get_metadata(&self, name: &str, version: &str) -> Option<ModelMetadata> {
        let models = self.models.read();
        models
            .get(name)?
            .iter()
            .find(|m| m.version == version)
            .cloned()
    }

    /// Current production version with its artifact; `Ok(None)` when the
    /// name is unknown or nothing is in production.
    pub fn get_production_model<A: Artifact>(
        &self,
        name: &str,
    ) -> GovResult<Option<LoadedModel<A>>> {
        if !self.models.read().contains_key(name) {
            tracing::warn!(name, "model not found in registry");
            return Ok(None);
        }
        match self.production_metadata(name) {
            Some(metadata) => self.load(metadata).map(Some),
            None => {
                tracing::warn!(name, "no production version");
                Ok(None)
            }
        }
    }

    pub fn get_model_version<A: Artifact>(
        &self,
        name: &str,
        version: &str,
    ) -> GovResult<Option<LoadedModel<A>>> {
        match self.get_metadata(name, version) {
            Some(metadata) => self.load(metadata).map(Some),
            None => Ok(None),
        }
    }

    fn load<A: Artifact>(&self, metadata: ModelMetadata) -> GovResult<LoadedModel<A>> {
        let bytes = self
            .backend
            .load_artifact(&metadata.name, &metadata.version)?;
        let artifact = A::from_bytes(&bytes)?;
        Ok(LoadedModel { metadata, artifact })
    }

    /// Rehash the stored artifact and compare it with the recorded
    /// `model_sha256`. `Ok(false)` means the bytes on storage changed after
    /// registration.
    pub fn verify_artifact(&self, name: &str, version: &str) -> GovResult<bool> {
        let metadata = self
            .get_metadata(name, version)
            .ok_or_else(|| GovernanceError::not_found_version(name, version))?;
        let actual = self.backend.artifact_sha256(name, version)?;
        let intact = metadata.model_sha256.as_deref() == Some(actual.as_str());
        if !intact {
            tracing::warn!(
                name,
                version,
                expected = ?metadata.model_sha256,
                actual = %actual,
                "artifact hash mismatch"
            );
        }
        Ok(intact)
    }

    /// Every record across all names, optionally filtered.
    pub fn list_models(&self, filter: Option<&ModelFilter>) -> Vec<ModelMetadata> {
        let models = self.models.read();
        models
            .values()
            .flatten()
            .filter(|m| filter.map_or(true, |f| f.matches(m)))
            .cloned()
            .collect()
    }

    pub fn list_versions(&self, name: &str) -> Vec<ModelMetadata> {
        self.models.read().get(name).cloned().unwrap_or_default()
    }

    /// Known model names in first-registration order.
    pub fn model_names(&self) -> Vec<String> {
        self.models.read().keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Lifecycle transitions
    // -----------------------------------------------------------------------

    /// Make `version` the single production version of `name`.
    ///
    /// Any other production version drops to `staging`. An unknown name or
    /// version returns `NotFound` and changes nothing.
    pub fn promote_to_production(
        &self,
        name: &str,
        version: &str,
        approved_by: &str,
        approval_notes: &str,
    ) -> GovResult<Promotion> {
        let _writer = self.writer.lock();

        let (original, target, demoted) = {
            let models = self.models.read();
            let Some(versions) = models.get(name) else {
                tracing::error!(name, version, "promotion rejected: model not found");
                return Err(GovernanceError::NotFound(name.to_string()));
            };
            let Some(current) = versions.iter().find(|m| m.version == version) else {
                tracing::error!(name, version, "promotion rejected: version not found");
                return Err(GovernanceError::not_found_version(name, version));
            };
            let mut target = current.clone();
            target.status = ModelStatus::Production;
            target.approved_by = Some(approved_by.to_string());
            target.approval_date = Some(Utc::now());
            let demoted = demotions(versions, version);
            let original: Vec<ModelMetadata> = versions
                .iter()
                .filter(|m| m.is_production() && m.version != version)
                .cloned()
                .collect();
            (original, target, demoted)
        };

        // Demotions hit the backend first so it never holds two production
        // records for one name.
        for (done, record) in demoted.iter().enumerate() {
            if let Err(e) = self.backend.update_metadata(record) {
                tracing::error!(name, version, error = %e, "promotion failed while demoting");
                self.restore(&original[..done]);
                return Err(e);
            }
        }
        if let Err(e) = self.backend.update_metadata(&target) {
            tracing::error!(name, version, error = %e, "promotion failed");
            self.restore(&original);
            return Err(e);
        }

        {
            let mut models = self.models.write();
            if let Some(versions) = models.get_mut(name) {
                apply_updates(versions, &demoted);
                apply_updates(versions, std::slice::from_ref(&target));
            }
        }

        let demoted: Vec<String> = demoted.into_iter().map(|m| m.version).collect();
        tracing::info!(
            name,
            version,
            approved_by,
            approval_notes,
            demoted = ?demoted,
            "promoted model to production"
        );
        Ok(Promotion {
            promoted: target,
            demoted,
        })
    }

    /// Retire a version. A deprecated production version leaves the model
    /// with no production version.
    pub fn deprecate(&self, name: &str, version: &str, actor: &str) -> GovResult<ModelMetadata> {
        let _writer = self.writer.lock();

        let Some(mut record) = self.get_metadata(name, version) else {
            tracing::error!(name, version, "deprecation rejected: version not found");
            return Err(GovernanceError::not_found_version(name, version));
        };
        record.status = ModelStatus::Deprecated;
        self.backend.update_metadata(&record)?;

        {
            let mut models = self.models.write();
            if let Some(versions) = models.get_mut(name) {
                apply_updates(versions, std::slice::from_ref(&record));
            }
        }

        tracing::info!(name, version, actor, "deprecated model");
        Ok(record)
    }

    /// Best-effort rewrite of records whose demotion already reached the
    /// backend before a later write failed.
    fn restore(&self, originals: &[ModelMetadata]) {
        for record in originals {
            if let Err(e) = self.backend.update_metadata(record) {
                tracing::error!(
                    name = %record.name,
                    version = %record.version,
                    error = %e,
                    "failed to restore metadata after aborted promotion"
                );
            }
        }
    }
}
