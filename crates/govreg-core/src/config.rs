//! Environment-driven configuration and component construction.
//!
//! | variable | default |
//! |---|---|
//! | `GOVREG_BACKEND` | `filesystem` (`sqlite`, `memory`) |
//! | `GOVREG_STORAGE_ROOT` | `model_registry` |
//! | `GOVREG_AUDIT_ROOT` | `audit_logs` |
//! | `GOVREG_AUDIT_DURABLE` | on |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::audit::AuditTrail;
use crate::errors::{GovResult, GovernanceError};
use crate::registry::ModelRegistry;
use crate::store::{FilesystemBackend, InMemoryBackend, SqliteBackend};

pub const DEFAULT_STORAGE_ROOT: &str = "model_registry";
pub const DEFAULT_AUDIT_ROOT: &str = "audit_logs";
pub const SQLITE_FILE_NAME: &str = "registry.db";

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

fn flag_enabled(value: Option<String>, default: bool) -> bool {
    match value {
        Some(val) => {
            let v = val.trim().to_lowercase();
            if default {
                !matches!(v.as_str(), "0" | "false" | "no" | "off")
            } else {
                matches!(v.as_str(), "1" | "true" | "yes" | "on")
            }
        }
        None => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Filesystem,
    Sqlite,
    Memory,
}

impl FromStr for BackendKind {
    type Err = GovernanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "filesystem" | "fs" => Ok(BackendKind::Filesystem),
            "sqlite" => Ok(BackendKind::Sqlite),
            "memory" | "none" => Ok(BackendKind::Memory),
            other => Err(GovernanceError::Validation(format!(
                "unknown storage backend {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceConfig {
    pub backend: BackendKind,
    pub storage_root: PathBuf,
    pub audit_root: PathBuf,
    pub audit_durable: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Filesystem,
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            audit_root: PathBuf::from(DEFAULT_AUDIT_ROOT),
            audit_durable: true,
        }
    }
}

impl GovernanceConfig {
    /// Filesystem backend and durable audit log, both rooted under `base`.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            storage_root: base.join(DEFAULT_STORAGE_ROOT),
            audit_root: base.join(DEFAULT_AUDIT_ROOT),
            ..Self::default()
        }
    }

    pub fn from_env() -> GovResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> GovResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(kind) = non_empty(lookup("GOVREG_BACKEND")) {
            config.backend = kind.parse()?;
        }
        if let Some(root) = non_empty(lookup("GOVREG_STORAGE_ROOT")) {
            config.storage_root = expand_tilde(&root);
        }
        if let Some(root) = non_empty(lookup("GOVREG_AUDIT_ROOT")) {
            config.audit_root = expand_tilde(&root);
        }
        config.audit_durable = flag_enabled(lookup("GOVREG_AUDIT_DURABLE"), true);
        Ok(config)
    }

    pub fn open_registry(&self) -> GovResult<ModelRegistry> {
        match self.backend {
            BackendKind::Filesystem => {
                ModelRegistry::new(FilesystemBackend::new(&self.storage_root)?)
            }
            BackendKind::Sqlite => ModelRegistry::new(SqliteBackend::new(
                self.storage_root.join(SQLITE_FILE_NAME),
            )?),
            BackendKind::Memory => ModelRegistry::new(InMemoryBackend::new()),
        }
    }

    pub fn open_audit_trail(&self) -> GovResult<AuditTrail> {
        if self.audit_durable {
            AuditTrail::durable(&self.audit_root)
        } else {
            Ok(AuditTrail::in_memory())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = GovernanceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GovernanceConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = GovernanceConfig::from_lookup(lookup(&[
            ("GOVREG_BACKEND", " SQLite "),
            ("GOVREG_STORAGE_ROOT", "/var/lib/govreg"),
            ("GOVREG_AUDIT_ROOT", "/var/log/govreg"),
            ("GOVREG_AUDIT_DURABLE", "off"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.storage_root, PathBuf::from("/var/lib/govreg"));
        assert_eq!(config.audit_root, PathBuf::from("/var/log/govreg"));
        assert!(!config.audit_durable);
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = GovernanceConfig::from_lookup(lookup(&[("GOVREG_BACKEND", "mlflow")]));
        assert!(err.is_err());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config =
            GovernanceConfig::from_lookup(lookup(&[("GOVREG_STORAGE_ROOT", "   ")])).unwrap();
        assert_eq!(config.storage_root, PathBuf::from(DEFAULT_STORAGE_ROOT));
    }

    #[test]
    fn tilde_expansion() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_tilde("~/models"), PathBuf::from(home).join("models"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn opens_components_from_config() {
        for backend in [BackendKind::Filesystem, BackendKind::Sqlite, BackendKind::Memory] {
            let dir = tempfile::tempdir().unwrap();
            let config = GovernanceConfig {
                backend,
                ..GovernanceConfig::rooted_at(dir.path())
            };
            let registry = config.open_registry().unwrap();
            let record = registry
                .register("capacity", &b"weights".to_vec(), "regressor", "etl", None)
                .unwrap();
            assert_eq!(record.version, "v1.0");
            drop(registry);

            let reopened = config.open_registry().unwrap();
            let expected = if backend == BackendKind::Memory { 0 } else { 1 };
            assert_eq!(reopened.list_versions("capacity").len(), expected);
        }
    }

    #[test]
    fn audit_durability_follows_flag() {
        let dir = tempfile::tempdir().unwrap();
        let durable = GovernanceConfig::rooted_at(dir.path());
        assert!(durable.open_audit_trail().unwrap().is_durable());

        let volatile = GovernanceConfig {
            audit_durable: false,
            ..durable
        };
        assert!(!volatile.open_audit_trail().unwrap().is_durable());
    }
}
