//! The resource a wait is bound to, plus the generation it must see reconciled.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::condition::ReadinessStatus;
use crate::decode::{ConditionsDecoder, DecodeError, StatusDecoder};
use crate::object::ObjectMeta;
use crate::{ResourceKey, ResourceKind};

#[derive(Clone)]
pub struct WatchTarget {
    key: ResourceKey,
    generation: i64,
    decoder: Arc<dyn StatusDecoder>,
}

impl WatchTarget {
    /// Target using the conventional conditions layout.
    pub fn new(kind: ResourceKind, namespace: Option<&str>, name: &str, generation: i64) -> Self {
        Self { key: ResourceKey::new(kind, namespace, name), generation, decoder: Arc::new(ConditionsDecoder) }
    }

    /// Build a target from the object returned by a create/update call.
    pub fn from_object(kind: ResourceKind, object: &Json) -> Result<Self, DecodeError> {
        let meta = ObjectMeta::of(object)?;
        let name = meta.name.as_deref().ok_or(DecodeError::Missing("metadata.name"))?;
        let generation = meta.generation.ok_or(DecodeError::Missing("metadata.generation"))?;
        Ok(Self::new(kind, meta.namespace.as_deref(), name, generation))
    }

    /// Replace the status decoder for kinds that do not follow the conventional layout.
    pub fn with_decoder(mut self, decoder: impl StatusDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.key.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.key.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    pub fn decode(&self, object: &Json) -> Result<ReadinessStatus, DecodeError> {
        self.decoder.decode(object)
    }
}

impl fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchTarget").field("key", &self.key).field("generation", &self.generation).finish()
    }
}
