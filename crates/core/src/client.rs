//! Contract of the control-plane API the waiter consumes.

use futures::stream::BoxStream;
use serde_json::Value as Json;
use thiserror::Error;

use crate::event::WatchEvent;
use crate::ResourceKey;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(ResourceKey),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Server-push events for exactly one resource identity. Dropping the stream closes it.
pub type EventStream = BoxStream<'static, Result<WatchEvent, ApiError>>;

/// Get + watch for a single named resource.
///
/// Implementations are shared by concurrent waits, each owning its own streams.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch the current object.
    async fn get(&self, key: &ResourceKey) -> Result<Json, ApiError>;

    /// Open a watch scoped to `key`'s namespace with an exact-match name selector,
    /// starting after `resource_version` (empty for "now").
    async fn watch(&self, key: &ResourceKey, resource_version: &str) -> Result<EventStream, ApiError>;
}
