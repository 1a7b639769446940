//! Settle core types: condition model, watch targets and the control-plane contract

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod client;
pub mod condition;
pub mod decode;
pub mod event;
pub mod object;
pub mod target;

pub use client::{ApiError, ControlPlane, EventStream};
pub use condition::{Condition, ConditionStatus, ReadinessStatus, READY};
pub use decode::{ConditionsDecoder, DecodeError, StatusDecoder};
pub use event::{ErrorStatus, WatchEvent};
pub use object::ObjectMeta;
pub use target::WatchTarget;

pub mod prelude {
    pub use super::{
        ApiError, Condition, ConditionStatus, ConditionsDecoder, ControlPlane, DecodeError, ErrorStatus,
        EventStream, ObjectMeta, ReadinessStatus, ResourceKey, ResourceKind, StatusDecoder, WatchEvent,
        WatchTarget, READY,
    };
}

/// Group/Version/Kind of a watched resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    /// Empty for the core group.
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Debug, Error)]
#[error("invalid gvk key: {0} (expect v1/Kind or group/v1/Kind)")]
pub struct InvalidGvkKey(pub String);

impl ResourceKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// Parse `v1/Kind` or `group/v1/Kind`.
    pub fn parse(key: &str) -> Result<Self, InvalidGvkKey> {
        let parts: Vec<_> = key.split('/').collect();
        match parts.as_slice() {
            [version, kind] if !version.is_empty() && !kind.is_empty() => Ok(Self::new("", *version, *kind)),
            [group, version, kind] if !group.is_empty() && !version.is_empty() && !kind.is_empty() => {
                Ok(Self::new(*group, *version, *kind))
            }
            _ => Err(InvalidGvkKey(key.to_string())),
        }
    }

    /// Split an `apiVersion` (`v1` or `group/v1`) and a kind into a ResourceKind.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((g, v)) => Self::new(g, v, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.gvk_key())
    }
}

/// Identity of one resource: kind, optional namespace (absent for cluster-scoped kinds) and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        Self { kind, namespace: namespace.map(|s| s.to_string()), name: name.to_string() }
    }

    /// Field selector matching exactly this resource's name.
    pub fn name_selector(&self) -> String {
        format!("metadata.name={}", self.name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind.kind, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_gvk_key_parses_core() {
        let k = ResourceKind::parse("v1/ConfigMap").expect("ok");
        assert_eq!(k.group, "");
        assert_eq!(k.version, "v1");
        assert_eq!(k.kind, "ConfigMap");
        assert_eq!(k.gvk_key(), "v1/ConfigMap");
    }

    #[test]
    fn parse_gvk_key_parses_group() {
        let k = ResourceKind::parse("kpack.io/v1alpha2/Builder").expect("ok");
        assert_eq!(k.group, "kpack.io");
        assert_eq!(k.version, "v1alpha2");
        assert_eq!(k.kind, "Builder");
        assert_eq!(k.to_string(), "kpack.io/v1alpha2/Builder");
    }

    #[test]
    fn parse_gvk_key_invalid_returns_err() {
        assert!(ResourceKind::parse("invalid").is_err());
        assert!(ResourceKind::parse("").is_err());
        assert!(ResourceKind::parse("a/b/c/d").is_err());
        assert!(ResourceKind::parse("v1/").is_err());
    }

    #[test]
    fn api_version_split() {
        assert_eq!(ResourceKind::from_api_version("v1", "Secret"), ResourceKind::new("", "v1", "Secret"));
        assert_eq!(
            ResourceKind::from_api_version("kpack.io/v1alpha2", "Image"),
            ResourceKind::new("kpack.io", "v1alpha2", "Image")
        );
    }

    #[test]
    fn key_selects_by_name() {
        let key = ResourceKey::new(ResourceKind::new("kpack.io", "v1alpha2", "Builder"), Some("ns"), "some-name");
        assert_eq!(key.name_selector(), "metadata.name=some-name");
        assert_eq!(key.to_string(), "Builder ns/some-name");
    }
}
