//! The opaque artifact capability.
//!
//! The registry never sees a concrete model type. Anything that can turn
//! itself into bytes and be rebuilt from them can be registered; the hash and
//! the stored blob are always taken over the same bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{GovResult, GovernanceError};

/// Something the registry can persist and load back.
pub trait Artifact: Sized {
    fn to_bytes(&self) -> GovResult<Vec<u8>>;
    fn from_bytes(bytes: &[u8]) -> GovResult<Self>;
}

impl Artifact for Vec<u8> {
    fn to_bytes(&self) -> GovResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn from_bytes(bytes: &[u8]) -> GovResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl Artifact for String {
    fn to_bytes(&self) -> GovResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> GovResult<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| GovernanceError::Serialization(format!("artifact is not UTF-8: {e}")))
    }
}

/// Adapter that stores any serde value as compact JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonArtifact<T>(pub T);

impl<T> JsonArtifact<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Artifact for JsonArtifact<T>
where
    T: Serialize + DeserializeOwned,
{
    fn to_bytes(&self) -> GovResult<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| GovernanceError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> GovResult<Self> {
        serde_json::from_slice(bytes)
            .map(JsonArtifact)
            .map_err(|e| GovernanceError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn json_artifact_restores_value() {
        let mut weights = BTreeMap::new();
        weights.insert("intercept".to_string(), -0.25);
        weights.insert("income".to_string(), 1.5);
        let bytes = JsonArtifact(weights.clone()).to_bytes().unwrap();
        let restored = JsonArtifact::<BTreeMap<String, f64>>::from_bytes(&bytes).unwrap();
        assert_eq!(restored.into_inner(), weights);
    }

    #[test]
    fn unsupported_object_graph_is_a_serialization_error() {
        let mut graph: HashMap<(u8, u8), f64> = HashMap::new();
        graph.insert((1, 2), 0.5);
        let err = JsonArtifact(graph).to_bytes().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn invalid_utf8_string_artifact() {
        let err = String::from_bytes(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
