//! Registry wrapper that records an audit entry for every mutation.

use serde_json::{json, Map, Value};

use crate::artifact::Artifact;
use crate::audit::AuditTrail;
use crate::config::GovernanceConfig;
use crate::errors::{GovResult, GovernanceError};
use crate::models::{AuditStatus, MetadataOverrides, ModelMetadata};
use crate::registry::{ModelRegistry, Promotion};

pub const ACTION_REGISTER: &str = "REGISTER";
pub const ACTION_PROMOTE: &str = "PROMOTE";
pub const ACTION_DEPRECATE: &str = "DEPRECATE";

fn as_details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `<name>:<version>` for a failed registration when a version was assigned.
fn failed_model_id(name: &str, err: &GovernanceError) -> String {
    match err {
        GovernanceError::Registration { version, .. } => format!("{name}:{version}"),
        _ => name.to_string(),
    }
}

#[derive(Debug)]
pub struct GovernedRegistry {
    registry: ModelRegistry,
    audit: AuditTrail,
}

impl GovernedRegistry {
    pub fn new(registry: ModelRegistry, audit: AuditTrail) -> Self {
        Self { registry, audit }
    }

    pub fn from_config(config: &GovernanceConfig) -> GovResult<Self> {
        Ok(Self::new(config.open_registry()?, config.open_audit_trail()?))
    }

    /// Read access to the underlying registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn register<A: Artifact>(
        &self,
        name: &str,
        artifact: &A,
        model_type: &str,
        created_by: &str,
        overrides: Option<MetadataOverrides>,
    ) -> GovResult<ModelMetadata> {
        match self
            .registry
            .register(name, artifact, model_type, created_by, overrides)
        {
            Ok(metadata) => {
                self.audit.log_action(
                    ACTION_REGISTER,
                    &metadata.model_id(),
                    created_by,
                    as_details(json!({
                        "model_type": metadata.model_type,
                        "domain": metadata.domain,
                        "status": metadata.status,
                        "model_sha256": metadata.model_sha256,
                    })),
                    AuditStatus::Success,
                );
                Ok(metadata)
            }
            Err(e) => {
                self.audit.log_action(
                    ACTION_REGISTER,
                    &failed_model_id(name, &e),
                    created_by,
                    as_details(json!({
                        "model_type": model_type,
                        "error": e.to_string(),
                    })),
                    AuditStatus::Failure,
                );
                Err(e)
            }
        }
    }

    pub fn promote_to_production(
        &self,
        name: &str,
        version: &str,
        approved_by: &str,
        approval_notes: &str,
    ) -> GovResult<Promotion> {
        let model_id = format!("{name}:{version}");
        let result = self
            .registry
            .promote_to_production(name, version, approved_by, approval_notes);
        let (details, status) = match &result {
            Ok(promotion) => (
                json!({
                    "approval_notes": approval_notes,
                    "demoted": promotion.demoted,
                }),
                AuditStatus::Success,
            ),
            Err(e) => (
                json!({
                    "approval_notes": approval_notes,
                    "error": e.to_string(),
                }),
                AuditStatus::Failure,
            ),
        };
        self.audit
            .log_action(ACTION_PROMOTE, &model_id, approved_by, as_details(details), status);
        result
    }

    pub fn deprecate(&self, name: &str, version: &str, actor: &str) -> GovResult<ModelMetadata> {
        let result = self.registry.deprecate(name, version, actor);
        let (details, status) = match &result {
            Ok(_) => (Map::new(), AuditStatus::Success),
            Err(e) => (
                as_details(json!({ "error": e.to_string() })),
                AuditStatus::Failure,
            ),
        };
        self.audit.log_action(
            ACTION_DEPRECATE,
            &format!("{name}:{version}"),
            actor,
            details,
            status,
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::artifact::JsonArtifact;
    use crate::models::ModelStatus;
    use crate::store::InMemoryBackend;

    fn governed() -> GovernedRegistry {
        GovernedRegistry::new(
            ModelRegistry::new(InMemoryBackend::new()).unwrap(),
            AuditTrail::in_memory(),
        )
    }

    #[test]
    fn every_mutation_is_audited() {
        let gov = governed();
        let a = gov
            .register("credit_scoring", &b"A".to_vec(), "classifier", "alice", None)
            .unwrap();
        gov.register("credit_scoring", &b"B".to_vec(), "classifier", "alice", None)
            .unwrap();
        gov.promote_to_production("credit_scoring", "v1.0", "bob", "initial release")
            .unwrap();
        gov.promote_to_production("credit_scoring", "v2.0", "bob", "upgrade")
            .unwrap();
        gov.deprecate("credit_scoring", "v1.0", "carol").unwrap();

        let logs = gov.audit().get_logs(None, None, 30);
        let actions: Vec<&str> = logs.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![ACTION_REGISTER, ACTION_REGISTER, ACTION_PROMOTE, ACTION_PROMOTE, ACTION_DEPRECATE]
        );
        assert!(logs.iter().all(|e| e.status == AuditStatus::Success));
        assert_eq!(logs[0].model_id, "credit_scoring:v1.0");
        assert_eq!(logs[0].details["model_sha256"], json!(a.model_sha256));
        assert_eq!(logs[3].details["demoted"], json!(["v1.0"]));
        assert_eq!(logs[3].details["approval_notes"], "upgrade");
        assert_eq!(logs[4].actor, "carol");

        assert_eq!(
            gov.registry().get_metadata("credit_scoring", "v1.0").unwrap().status,
            ModelStatus::Deprecated
        );
    }

    #[test]
    fn failures_are_audited_and_returned() {
        let gov = governed();
        let mut graph: HashMap<(u8, u8), f64> = HashMap::new();
        graph.insert((1, 1), 1.0);
        assert!(gov
            .register("credit_scoring", &JsonArtifact(graph), "classifier", "alice", None)
            .is_err());
        assert!(gov
            .promote_to_production("nosuch", "v1.0", "bob", "")
            .is_err());

        let failures: Vec<_> = gov
            .audit()
            .get_logs(None, None, 30)
            .into_iter()
            .filter(|e| e.status == AuditStatus::Failure)
            .collect();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].model_id, "credit_scoring:v1.0");
        assert!(failures[0].details["error"]
            .as_str()
            .unwrap()
            .contains("Serialization"));
        assert_eq!(failures[1].model_id, "nosuch:v1.0");
    }

    #[test]
    fn durable_stack_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = GovernanceConfig::rooted_at(dir.path());
        {
            let gov = GovernedRegistry::from_config(&config).unwrap();
            gov.register("capacity", &b"w".to_vec(), "regressor", "etl", None)
                .unwrap();
            gov.promote_to_production("capacity", "v1.0", "ops", "go live")
                .unwrap();
        }

        let gov = GovernedRegistry::from_config(&config).unwrap();
        assert_eq!(
            gov.registry()
                .production_metadata("capacity")
                .unwrap()
                .approved_by
                .as_deref(),
            Some("ops")
        );
        assert_eq!(gov.audit().get_logs(Some("capacity:v1.0"), None, 30).len(), 2);
    }
}
