//! Governed model registry core.
//!
//! Versioned storage of model artifacts with lifecycle metadata, a
//! single-production-version invariant per model name, and an append-only
//! audit trail of governance actions. Storage is pluggable through
//! [`store::StorageBackend`] (filesystem, SQLite, in-memory).
//!
//! With the `python` feature the crate also builds the `_govreg_core`
//! extension module via PyO3.

pub mod artifact;
pub mod audit;
pub mod config;
pub mod errors;
pub mod governance;
pub mod guards;
pub mod hashing;
pub mod models;
pub mod registry;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use artifact::{Artifact, JsonArtifact};
pub use audit::AuditTrail;
pub use config::{BackendKind, GovernanceConfig};
pub use errors::{ErrorKind, GovResult, GovernanceError};
pub use governance::GovernedRegistry;
pub use models::{
    AuditEntry, AuditStatus, LoadedModel, MetadataOverrides, ModelFilter, ModelMetadata,
    ModelStatus,
};
pub use registry::{ModelRegistry, Promotion};
pub use store::StorageBackend;

// ---------------------------------------------------------------------------
// Top-level Python module: _govreg_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn _govreg_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyModelRegistry>()?;
    m.add_class::<python::PyAuditTrail>()?;

    m.add("MAX_MODEL_NAME_LENGTH", guards::MAX_MODEL_NAME_LENGTH)?;
    m.add("DEFAULT_DAYS_BACK", guards::DEFAULT_DAYS_BACK)?;
    m.add("DEFAULT_DOMAIN", models::DEFAULT_DOMAIN)?;

    m.add_function(pyo3::wrap_pyfunction!(python::compute_content_hash, m)?)?;
    Ok(())
}
