//! Shared guardrails for model names, version tags, and query bounds.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{GovResult, GovernanceError};

pub const MAX_MODEL_NAME_LENGTH: usize = 128;
pub const DEFAULT_DAYS_BACK: u32 = 30;
pub const MAX_DAYS_BACK: u32 = 36_500;

// Model names double as directory names under the storage root.
static MODEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap());

static VERSION_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v([1-9][0-9]*)\.0$").unwrap());

pub fn validate_model_name(name: &str) -> GovResult<()> {
    if name.is_empty()
        || name.len() > MAX_MODEL_NAME_LENGTH
        || name.contains("..")
        || !MODEL_NAME_RE.is_match(name)
    {
        return Err(GovernanceError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Metric values must be finite: JSON has no encoding for NaN or infinity,
/// and a `null` written in their place cannot be read back as `f64`.
pub fn validate_metrics(metrics: &BTreeMap<String, f64>) -> GovResult<()> {
    match metrics.iter().find(|(_, value)| !value.is_finite()) {
        Some((metric, value)) => Err(GovernanceError::Validation(format!(
            "performance metric {metric:?} is not finite ({value})"
        ))),
        None => Ok(()),
    }
}

/// Render the tag for the `sequence`-th version of a model (`v{N}.0`).
pub fn version_tag(sequence: u32) -> String {
    format!("v{sequence}.0")
}

/// Inverse of [`version_tag`]. Returns `None` for tags this registry never
/// issues.
pub fn parse_version_tag(tag: &str) -> Option<u32> {
    VERSION_TAG_RE
        .captures(tag)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

pub fn clamp_days_back(days: i64) -> u32 {
    clamp_int(days, 0, MAX_DAYS_BACK as i64) as u32
}
