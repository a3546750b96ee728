//! Error types for the governance registry.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Coarse classification every [`GovernanceError`] maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown model name or version.
    NotFound,
    /// I/O failure on artifact or metadata read/write.
    Storage,
    /// Artifact could not be turned into bytes (or back).
    Serialization,
    /// Malformed input or persisted metadata.
    Validation,
}

/// Top-level error enum for the governance registry.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid model name: {0:?}")]
    InvalidName(String),

    #[error("Registration of {name}:{version} failed: {source}")]
    Registration {
        name: String,
        version: String,
        #[source]
        source: Box<GovernanceError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl GovernanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GovernanceError::NotFound(_) => ErrorKind::NotFound,
            GovernanceError::Storage(_) | GovernanceError::Sqlite(_) => ErrorKind::Storage,
            GovernanceError::Io(err) if err.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            GovernanceError::Io(_) => ErrorKind::Storage,
            GovernanceError::Serialization(_) => ErrorKind::Serialization,
            GovernanceError::Validation(_) | GovernanceError::InvalidName(_) => {
                ErrorKind::Validation
            }
            GovernanceError::Registration { source, .. } => source.kind(),
        }
    }

    /// Wrap a failure raised while registering `name` at `version`.
    pub fn registration(name: &str, version: &str, source: GovernanceError) -> Self {
        GovernanceError::Registration {
            name: name.to_string(),
            version: version.to_string(),
            source: Box::new(source),
        }
    }

    pub fn not_found_version(name: &str, version: &str) -> Self {
        GovernanceError::NotFound(format!("{name}:{version}"))
    }
}

#[cfg(feature = "python")]
impl From<GovernanceError> for PyErr {
    fn from(err: GovernanceError) -> PyErr {
        match err.kind() {
            ErrorKind::NotFound => PyKeyError::new_err(err.to_string()),
            ErrorKind::Storage => match &err {
                GovernanceError::Io(_) => PyIOError::new_err(err.to_string()),
                _ => PyRuntimeError::new_err(err.to_string()),
            },
            ErrorKind::Serialization => PyValueError::new_err(err.to_string()),
            ErrorKind::Validation => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type GovResult<T> = Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_inherits_source_kind() {
        let err = GovernanceError::registration(
            "credit_scoring",
            "v3.0",
            GovernanceError::Serialization("unsupported object graph".into()),
        );
        assert_eq!(err.kind(), ErrorKind::Serialization);
        let message = err.to_string();
        assert!(message.contains("credit_scoring:v3.0"));
        assert!(message.contains("unsupported object graph"));
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(GovernanceError::from(io).kind(), ErrorKind::NotFound);
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(GovernanceError::from(io).kind(), ErrorKind::Storage);
    }
}
