//! Python bindings (`python` feature) for the orchestration layer.
//!
//! Artifacts cross the boundary as `bytes`; metadata and audit entries come
//! back as plain dicts. `promote_to_production` keeps the boolean contract
//! Python callers already depend on.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyString};
use serde_json::{Map, Value};

use crate::audit::AuditTrail;
use crate::config::{BackendKind, GovernanceConfig};
use crate::errors::GovernanceError;
use crate::guards::DEFAULT_DAYS_BACK;
use crate::hashing::sha256_hex;
use crate::models::{AuditStatus, LoadedModel, MetadataOverrides, ModelFilter, ModelStatus};
use crate::registry::ModelRegistry;

// ---------------------------------------------------------------------------
// Helpers: serde_json <-> Python
// ---------------------------------------------------------------------------

fn value_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Null => py.None(),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any().unbind(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_pyobject(py)?.into_any().unbind()
            } else {
                n.as_f64()
                    .unwrap_or(f64::NAN)
                    .into_pyobject(py)?
                    .into_any()
                    .unbind()
            }
        }
        Value::String(s) => PyString::new(py, s).into_any().unbind(),
        Value::Array(items) => {
            let converted = items
                .iter()
                .map(|item| value_to_py(py, item))
                .collect::<PyResult<Vec<PyObject>>>()?;
            PyList::new(py, converted)?.into_any().unbind()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key, value_to_py(py, item)?)?;
            }
            dict.into_any().unbind()
        }
    })
}

fn to_py<T: serde::Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    let json = serde_json::to_value(value)
        .map_err(|e| GovernanceError::Serialization(e.to_string()))?;
    value_to_py(py, &json)
}

fn dict_to_map(py: Python<'_>, dict: &Bound<'_, PyDict>) -> PyResult<Map<String, Value>> {
    let dumped: String = py
        .import("json")?
        .call_method1("dumps", (dict,))?
        .extract()?;
    serde_json::from_str(&dumped).map_err(|e| PyValueError::new_err(e.to_string()))
}

fn parse_timestamp(raw: &str) -> PyResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PyValueError::new_err(format!("invalid timestamp {raw:?}: {e}")))
}

fn overrides_from_dict(dict: &Bound<'_, PyDict>) -> PyResult<MetadataOverrides> {
    let mut overrides = MetadataOverrides::default();
    if let Some(v) = dict.get_item("domain")? {
        overrides.domain = v.extract()?;
    }
    if let Some(v) = dict.get_item("status")? {
        if let Some(raw) = v.extract::<Option<String>>()? {
            overrides.status = Some(raw.parse::<ModelStatus>()?);
        }
    }
    if let Some(v) = dict.get_item("approval_date")? {
        if let Some(raw) = v.extract::<Option<String>>()? {
            overrides.approval_date = Some(parse_timestamp(&raw)?);
        }
    }
    if let Some(v) = dict.get_item("approved_by")? {
        overrides.approved_by = v.extract()?;
    }
    if let Some(v) = dict.get_item("performance_metrics")? {
        overrides.performance_metrics = v.extract::<Option<BTreeMap<String, f64>>>()?;
    }
    if let Some(v) = dict.get_item("validation_report")? {
        overrides.validation_report = v.extract()?;
    }
    if let Some(v) = dict.get_item("data_sha256")? {
        overrides.data_sha256 = v.extract()?;
    }
    Ok(overrides)
}

fn loaded_to_py(py: Python<'_>, loaded: LoadedModel<Vec<u8>>) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("metadata", to_py(py, &loaded.metadata)?)?;
    dict.set_item("model", pyo3::types::PyBytes::new(py, &loaded.artifact))?;
    Ok(dict.into_any().unbind())
}

// ---------------------------------------------------------------------------
// ModelRegistry
// ---------------------------------------------------------------------------

#[pyclass(name = "ModelRegistry")]
pub struct PyModelRegistry {
    inner: ModelRegistry,
}

#[pymethods]
impl PyModelRegistry {
    #[new]
    #[pyo3(signature = (backend="filesystem", uri="model_registry"))]
    fn new(backend: &str, uri: &str) -> PyResult<Self> {
        let config = GovernanceConfig {
            backend: backend.parse::<BackendKind>()?,
            storage_root: PathBuf::from(uri),
            ..GovernanceConfig::default()
        };
        Ok(Self {
            inner: config.open_registry()?,
        })
    }

    #[pyo3(signature = (name, model, model_type, created_by, metadata=None))]
    fn register(
        &self,
        py: Python<'_>,
        name: &str,
        model: Vec<u8>,
        model_type: &str,
        created_by: &str,
        metadata: Option<Bound<'_, PyDict>>,
    ) -> PyResult<PyObject> {
        let overrides = metadata.as_ref().map(overrides_from_dict).transpose()?;
        let record = py.allow_threads(|| {
            self.inner
                .register(name, &model, model_type, created_by, overrides)
        })?;
        to_py(py, &record)
    }

    fn get_production_model(&self, py: Python<'_>, name: &str) -> PyResult<Option<PyObject>> {
        self.inner
            .get_production_model::<Vec<u8>>(name)?
            .map(|loaded| loaded_to_py(py, loaded))
            .transpose()
    }

    fn get_model_version(
        &self,
        py: Python<'_>,
        name: &str,
        version: &str,
    ) -> PyResult<Option<PyObject>> {
        self.inner
            .get_model_version::<Vec<u8>>(name, version)?
            .map(|loaded| loaded_to_py(py, loaded))
            .transpose()
    }

    #[pyo3(signature = (filters=None))]
    fn list_models(
        &self,
        py: Python<'_>,
        filters: Option<HashMap<String, String>>,
    ) -> PyResult<PyObject> {
        let filter = filters.map(ModelFilter::from_pairs);
        to_py(py, &self.inner.list_models(filter.as_ref()))
    }

    /// Returns `False` (and logs the reason) when the target is unknown or
    /// the metadata rewrite fails.
    fn promote_to_production(
        &self,
        name: &str,
        version: &str,
        approved_by: &str,
        approval_notes: &str,
    ) -> bool {
        self.inner
            .promote_to_production(name, version, approved_by, approval_notes)
            .is_ok()
    }

    fn deprecate(&self, py: Python<'_>, name: &str, version: &str, actor: &str) -> PyResult<PyObject> {
        let record = self.inner.deprecate(name, version, actor)?;
        to_py(py, &record)
    }

    fn verify_artifact(&self, name: &str, version: &str) -> PyResult<bool> {
        Ok(self.inner.verify_artifact(name, version)?)
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

#[pyclass(name = "AuditTrail")]
pub struct PyAuditTrail {
    inner: AuditTrail,
}

#[pymethods]
impl PyAuditTrail {
    #[new]
    #[pyo3(signature = (storage="filesystem", path="audit_logs"))]
    fn new(storage: &str, path: &str) -> PyResult<Self> {
        let inner = match storage {
            "filesystem" => AuditTrail::durable(path)?,
            "memory" => AuditTrail::in_memory(),
            other => {
                return Err(PyValueError::new_err(format!(
                    "unknown audit storage {other:?}"
                )))
            }
        };
        Ok(Self { inner })
    }

    #[pyo3(signature = (action, model_id, actor, details=None, status="SUCCESS"))]
    fn log_action(
        &self,
        py: Python<'_>,
        action: &str,
        model_id: &str,
        actor: &str,
        details: Option<Bound<'_, PyDict>>,
        status: &str,
    ) -> bool {
        let details = match details.as_ref().map(|d| dict_to_map(py, d)).transpose() {
            Ok(map) => map.unwrap_or_default(),
            Err(e) => {
                tracing::error!(action, model_id, error = %e, "unserializable audit details");
                return false;
            }
        };
        let status = match status.parse::<AuditStatus>() {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(action, model_id, error = %e, "rejected audit entry");
                return false;
            }
        };
        self.inner
            .log_action(action, model_id, actor, details, status)
    }

    #[pyo3(signature = (model_id=None, action=None, days_back=DEFAULT_DAYS_BACK))]
    fn get_logs(
        &self,
        py: Python<'_>,
        model_id: Option<&str>,
        action: Option<&str>,
        days_back: u32,
    ) -> PyResult<PyObject> {
        to_py(py, &self.inner.get_logs(model_id, action, days_back))
    }
}

/// SHA-256 hex digest of raw artifact bytes.
#[pyfunction]
pub fn compute_content_hash(data: Vec<u8>) -> String {
    sha256_hex(&data)
}
