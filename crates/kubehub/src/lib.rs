//! Settle kubehub – discovery and single-resource get/watch wiring over kube-rs

#![forbid(unsafe_code)]

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use futures::{future, StreamExt};
use kube::{
    api::{Api, WatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind, WatchEvent as KubeEvent},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::counter;
use settle_core::{ApiError, ControlPlane, ErrorStatus, EventStream, ResourceKey, ResourceKind, WatchEvent};
use serde_json::Value as Json;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from current context")
}

/// Resolve a kind to its served API resource and whether it is namespaced.
pub async fn find_api_resource(client: Client, kind: &ResourceKind) -> Result<(ApiResource, bool)> {
    let gvk = GroupVersionKind { group: kind.group.clone(), version: kind.version.clone(), kind: kind.kind.clone() };
    let discovery = Discovery::new(client).run().await?;
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                return Ok((ar.clone(), namespaced));
            }
        }
    }
    Err(anyhow!("GVK not found: {}/{}/{}", gvk.group, gvk.version, gvk.kind))
}

/// Build a dynamic API handle scoped to `namespace` (ignored for cluster-scoped kinds).
pub fn dynamic_api(client: Client, ar: &ApiResource, namespaced: bool, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
    if namespaced {
        match namespace {
            Some(ns) => Ok(Api::namespaced_with(client, ns, ar)),
            None => Err(anyhow!("namespace required for namespaced kind {}", ar.kind)),
        }
    } else {
        Ok(Api::all_with(client, ar))
    }
}

pub fn strip_managed_fields(v: &mut Json) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

pub fn object_to_json(obj: &DynamicObject) -> Result<Json> {
    let mut raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
    strip_managed_fields(&mut raw);
    Ok(raw)
}

/// Map one kube watch event; bookmarks carry no object state and are dropped.
fn convert_event(ev: KubeEvent<DynamicObject>) -> Result<Option<WatchEvent>> {
    Ok(match ev {
        KubeEvent::Added(o) => Some(WatchEvent::Added(object_to_json(&o)?)),
        KubeEvent::Modified(o) => Some(WatchEvent::Modified(object_to_json(&o)?)),
        KubeEvent::Deleted(o) => Some(WatchEvent::Deleted(object_to_json(&o)?)),
        KubeEvent::Bookmark(_) => None,
        KubeEvent::Error(e) => Some(WatchEvent::Error(ErrorStatus {
            status: e.status,
            message: e.message,
            reason: e.reason,
            code: e.code,
        })),
    })
}

fn api_error(key: &ResourceKey, err: kube::Error) -> ApiError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ApiError::NotFound(key.clone()),
        other => ApiError::Transport(anyhow::Error::new(other).context(format!("{}", key))),
    }
}

/// [`ControlPlane`] backed by a kube [`Client`]. Safe to share across concurrent waits;
/// discovery results are cached per instance.
pub struct KubeControlPlane {
    client: Client,
    resources: Mutex<HashMap<ResourceKind, (ApiResource, bool)>>,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client, resources: Mutex::new(HashMap::new()) }
    }

    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(get_kube_client().await?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Cached [`find_api_resource`].
    pub async fn resolve(&self, kind: &ResourceKind) -> Result<(ApiResource, bool)> {
        if let Some(hit) = self.resources.lock().await.get(kind).cloned() {
            return Ok(hit);
        }
        let resolved = find_api_resource(self.client.clone(), kind).await?;
        debug!(gvk = %kind, plural = %resolved.0.plural, namespaced = resolved.1, "resolved api resource");
        self.resources.lock().await.insert(kind.clone(), resolved.clone());
        Ok(resolved)
    }

    async fn api_for(&self, key: &ResourceKey) -> Result<Api<DynamicObject>> {
        let (ar, namespaced) = self.resolve(&key.kind).await?;
        dynamic_api(self.client.clone(), &ar, namespaced, key.namespace.as_deref())
    }
}

#[async_trait::async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get(&self, key: &ResourceKey) -> Result<Json, ApiError> {
        let api = self.api_for(key).await?;
        let obj = api.get(&key.name).await.map_err(|e| api_error(key, e))?;
        Ok(object_to_json(&obj)?)
    }

    async fn watch(&self, key: &ResourceKey, resource_version: &str) -> Result<EventStream, ApiError> {
        let api = self.api_for(key).await?;
        let wp = WatchParams::default().fields(&key.name_selector());
        let stream = api.watch(&wp, resource_version).await.map_err(|e| api_error(key, e))?;
        counter!("kube_watch_opens", 1u64);
        info!(kind = %key.kind, ns = ?key.namespace, name = %key.name, rv = %resource_version, "watch opened");
        let key = key.clone();
        let events = stream.filter_map(move |item| {
            let mapped = match item {
                Ok(ev) => convert_event(ev).map_err(ApiError::Transport).transpose(),
                Err(e) => Some(Err(api_error(&key, e))),
            };
            future::ready(mapped)
        });
        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn dyn_obj(name: &str) -> DynamicObject {
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk("kpack.io", "v1alpha2", "Builder"));
        let mut o = DynamicObject::new(name, &ar).within("ns");
        o.metadata.generation = Some(3);
        o.data = serde_json::json!({"status": {"observedGeneration": 3}});
        o
    }

    #[test]
    fn converts_object_events() {
        let ev = convert_event(KubeEvent::Modified(dyn_obj("b"))).expect("convert").expect("some");
        match ev {
            WatchEvent::Modified(raw) => {
                assert_eq!(raw.pointer("/metadata/name"), Some(&serde_json::json!("b")));
                assert_eq!(raw.pointer("/metadata/generation"), Some(&serde_json::json!(3)));
                assert_eq!(raw.pointer("/status/observedGeneration"), Some(&serde_json::json!(3)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn converts_error_status() {
        let ev = convert_event(KubeEvent::Error(ErrorResponse {
            status: "Failure".into(),
            message: "too old resource version: 23358 (23360)".into(),
            reason: "Expired".into(),
            code: 410,
        }))
        .expect("convert")
        .expect("some");
        match ev {
            WatchEvent::Error(st) => {
                assert!(st.is_expired());
                assert_eq!(st.code, 410);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn strip_managed_fields_prunes_metadata() {
        let mut v = serde_json::json!({"metadata": {"name": "x", "managedFields": [{"manager": "kubectl"}]}});
        strip_managed_fields(&mut v);
        assert!(v.pointer("/metadata/managedFields").is_none());
        assert_eq!(v.pointer("/metadata/name"), Some(&serde_json::json!("x")));
    }
}
