//! Object metadata fields the waiter relies on.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::decode::DecodeError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Spec generation, bumped by the control plane on every desired-state change.
    #[serde(default)]
    pub generation: Option<i64>,
    #[serde(default)]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    /// Decode `metadata` from an object payload.
    pub fn of(object: &Json) -> Result<Self, DecodeError> {
        let obj = object.as_object().ok_or(DecodeError::NotAnObject)?;
        let meta = obj.get("metadata").ok_or(DecodeError::Missing("metadata"))?;
        if !meta.is_object() {
            return Err(DecodeError::Type { field: "metadata", expected: "object" });
        }
        serde_json::from_value(meta.clone()).map_err(|source| DecodeError::Field { field: "metadata", source })
    }

    /// Resource version, or the empty string (meaning "most recent") when absent.
    pub fn resource_version_or_latest(&self) -> &str {
        self.resource_version.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_identity_and_versions() {
        let obj = json!({"metadata": {
            "name": "some-name",
            "namespace": "some-namespace",
            "generation": 2,
            "resourceVersion": "23358",
            "managedFields": []
        }});
        let meta = ObjectMeta::of(&obj).expect("meta");
        assert_eq!(meta.name.as_deref(), Some("some-name"));
        assert_eq!(meta.namespace.as_deref(), Some("some-namespace"));
        assert_eq!(meta.generation, Some(2));
        assert_eq!(meta.resource_version_or_latest(), "23358");
    }

    #[test]
    fn rejects_missing_or_malformed_metadata() {
        assert!(matches!(ObjectMeta::of(&json!({})), Err(DecodeError::Missing("metadata"))));
        assert!(ObjectMeta::of(&json!({"metadata": "x"})).is_err());
        assert!(ObjectMeta::of(&json!({"metadata": {"generation": "two"}})).is_err());
        assert_eq!(ObjectMeta::of(&json!({"metadata": {}})).expect("meta").resource_version_or_latest(), "");
    }
}
