//! Shared typed records used across the registry, storage, and audit layers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::GovernanceError;

/// Domain tag applied when the caller does not supply one.
pub const DEFAULT_DOMAIN: &str = "general";

// ---------------------------------------------------------------------------
// ModelStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a registered model version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    #[default]
    Development,
    Staging,
    Production,
    Deprecated,
}

impl ModelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelStatus::Development => "development",
            ModelStatus::Staging => "staging",
            ModelStatus::Production => "production",
            ModelStatus::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelStatus {
    type Err = GovernanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "development" => Ok(ModelStatus::Development),
            "staging" => Ok(ModelStatus::Staging),
            "production" => Ok(ModelStatus::Production),
            "deprecated" => Ok(ModelStatus::Deprecated),
            other => Err(GovernanceError::Validation(format!(
                "unknown model status {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ModelMetadata
// ---------------------------------------------------------------------------

/// Metadata describing one registered model version.
///
/// Serialized field-for-field into `metadata.json`; optional fields are
/// written as explicit `null`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    pub model_type: String,
    pub domain: String,
    pub created_date: DateTime<Utc>,
    pub created_by: String,
    pub approval_date: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub status: ModelStatus,
    pub performance_metrics: Option<BTreeMap<String, f64>>,
    pub validation_report: Option<String>,
    pub data_sha256: Option<String>,
    pub model_sha256: Option<String>,
}

impl ModelMetadata {
    /// Identifier used in audit entries: `<name>:<version>`.
    pub fn model_id(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    pub fn is_production(&self) -> bool {
        self.status == ModelStatus::Production
    }
}

/// Caller-supplied fields that override registration defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataOverrides {
    pub domain: Option<String>,
    pub status: Option<ModelStatus>,
    pub approval_date: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub performance_metrics: Option<BTreeMap<String, f64>>,
    pub validation_report: Option<String>,
    pub data_sha256: Option<String>,
}

impl MetadataOverrides {
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_status(mut self, status: ModelStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_metric(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.performance_metrics
            .get_or_insert_with(BTreeMap::new)
            .insert(metric.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// ModelFilter
// ---------------------------------------------------------------------------

/// Filter accepted by `list_models`. Set fields are AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelFilter {
    pub domain: Option<String>,
    pub status: Option<String>,
}

impl ModelFilter {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            status: None,
        }
    }

    pub fn status(status: ModelStatus) -> Self {
        Self {
            domain: None,
            status: Some(status.as_str().to_string()),
        }
    }

    /// Build a filter from loose key/value pairs. Only `domain` and `status`
    /// are recognised; other keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut filter = Self::default();
        for (key, value) in pairs {
            match key.as_ref() {
                "domain" => filter.domain = Some(value.into()),
                "status" => filter.status = Some(value.into()),
                _ => {}
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_none() && self.status.is_none()
    }

    pub fn matches(&self, metadata: &ModelMetadata) -> bool {
        if let Some(domain) = &self.domain {
            if metadata.domain != *domain {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if metadata.status.as_str() != status {
                return false;
            }
        }
        true
    }
}

/// A metadata record paired with its deserialized artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel<A> {
    pub metadata: ModelMetadata,
    pub artifact: A,
}

// ---------------------------------------------------------------------------
// Audit records
// ---------------------------------------------------------------------------

/// Outcome recorded on an audit entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    #[default]
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failure => "FAILURE",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = GovernanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILURE" => Ok(AuditStatus::Failure),
            other => Err(GovernanceError::Validation(format!(
                "unknown audit status {other:?}"
            ))),
        }
    }
}

/// One immutable line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub model_id: String,
    pub actor: String,
    pub details: Map<String, Value>,
    pub status: AuditStatus,
}
