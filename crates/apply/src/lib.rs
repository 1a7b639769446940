//! Settle apply: submit a YAML manifest by server-side apply and hand back the
//! object the control plane stored, ready to be waited on.

#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use kube::api::{Patch, PatchParams};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use settle_core::{ResourceKey, ResourceKind, WatchTarget};
use settle_kubehub::{dynamic_api, object_to_json, KubeControlPlane};
use tracing::info;

pub const DEFAULT_FIELD_MANAGER: &str = "settlectl";

fn max_yaml_bytes() -> usize {
    std::env::var("SETTLE_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

fn max_yaml_nodes() -> usize {
    std::env::var("SETTLE_MAX_YAML_NODES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100_000)
}

fn json_node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur >= max { return; }
        *cur += 1;
        match v {
            Json::Object(map) => {
                for vv in map.values() {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            Json::Array(arr) => {
                for vv in arr.iter() {
                    if *cur >= max { break; }
                    walk(vv, cur, max);
                }
            }
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count >= max
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOptions {
    pub field_manager: String,
    /// Ask the server to validate without persisting.
    pub dry_run: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { field_manager: DEFAULT_FIELD_MANAGER.to_string(), dry_run: false }
    }
}

/// A parsed manifest and the identity it targets.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub json: Json,
    pub key: ResourceKey,
}

#[derive(Debug, Clone)]
pub struct Applied {
    pub key: ResourceKey,
    /// Object as stored by the server (or as validated, for dry runs).
    pub object: Json,
    pub dry_run: bool,
}

impl Applied {
    /// Target for waiting on the generation this apply produced.
    pub fn watch_target(&self) -> Result<WatchTarget> {
        WatchTarget::from_object(self.key.kind.clone(), &self.object).context("reading applied object metadata")
    }
}

pub fn parse_manifest(yaml: &str, ns_override: Option<&str>) -> Result<Manifest> {
    if yaml.len() > max_yaml_bytes() {
        return Err(anyhow!("YAML payload too large (>{} bytes)", max_yaml_bytes()));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(yaml).context("parsing YAML")?;
    let mut json = serde_json::to_value(val).context("converting YAML to JSON")?;
    if json_node_budget_exceeded(&json, max_yaml_nodes()) {
        return Err(anyhow!("YAML document too complex (>{} nodes)", max_yaml_nodes()));
    }
    let api_version = json.get("apiVersion").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("YAML missing apiVersion"))?;
    let kind_s = json.get("kind").and_then(|v| v.as_str()).ok_or_else(|| anyhow!("YAML missing kind"))?;
    let kind = ResourceKind::from_api_version(api_version, kind_s);
    let name = json
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("YAML missing metadata.name"))?
        .to_string();
    let ns = ns_override
        .map(|s| s.to_string())
        .or_else(|| json.get("metadata").and_then(|m| m.get("namespace")).and_then(|v| v.as_str()).map(|s| s.to_string()));
    ensure_metadata(&mut json, &name, ns.as_deref())?;
    Ok(Manifest { json, key: ResourceKey::new(kind, ns.as_deref(), &name) })
}

fn ensure_metadata(v: &mut Json, name: &str, ns: Option<&str>) -> Result<()> {
    let root = v.as_object_mut().ok_or_else(|| anyhow!("YAML document is not a mapping"))?;
    let meta = root.entry("metadata").or_insert_with(|| Json::Object(serde_json::Map::new()));
    let obj = meta.as_object_mut().ok_or_else(|| anyhow!("metadata is not a mapping"))?;
    obj.insert("name".into(), Json::String(name.to_string()));
    if let Some(ns) = ns {
        obj.insert("namespace".into(), Json::String(ns.to_string()));
    }
    Ok(())
}

/// Server-side apply `manifest`.
pub async fn apply(cp: &KubeControlPlane, manifest: &Manifest, opts: &ApplyOptions) -> Result<Applied> {
    let t0 = std::time::Instant::now();
    counter!("apply_attempts", 1u64);
    let key = &manifest.key;
    let (ar, namespaced) = cp.resolve(&key.kind).await?;
    let api = dynamic_api(cp.client().clone(), &ar, namespaced, key.namespace.as_deref())?;

    let mut pp = PatchParams::apply(&opts.field_manager);
    if opts.dry_run {
        pp = pp.dry_run();
    }
    let obj = match api.patch(&key.name, &pp, &Patch::Apply(&manifest.json)).await {
        Ok(o) => o,
        Err(e) => {
            counter!("apply_err", 1u64);
            return Err(anyhow!("server-side apply failed: {}", e));
        }
    };
    histogram!("apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
    counter!("apply_ok", 1u64);
    info!(
        gvk = %key.kind,
        ns = ?key.namespace,
        name = %key.name,
        dry_run = opts.dry_run,
        generation = ?obj.metadata.generation,
        rv = ?obj.metadata.resource_version,
        "applied"
    );
    Ok(Applied { key: key.clone(), object: object_to_json(&obj)?, dry_run: opts.dry_run })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_yaml_errors_are_friendly() {
        let y1 = "kind: Foo\nmetadata:\n  name: x\n";
        let e1 = parse_manifest(y1, None).unwrap_err().to_string();
        assert!(e1.contains("missing apiVersion"), "e1={}", e1);

        let y2 = "apiVersion: v1\nmetadata:\n  name: x\n";
        let e2 = parse_manifest(y2, None).unwrap_err().to_string();
        assert!(e2.contains("missing kind"), "e2={}", e2);

        let y3 = "apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n";
        let e3 = parse_manifest(y3, None).unwrap_err().to_string();
        assert!(e3.contains("missing metadata.name"), "e3={}", e3);
    }

    #[test]
    fn parse_manifest_resolves_kind_and_namespace() {
        let y = "apiVersion: kpack.io/v1alpha2\nkind: Image\nmetadata:\n  name: my-image\n  namespace: from-yaml\nspec:\n  tag: registry.example.com/app\n";
        let m = parse_manifest(y, None).expect("manifest");
        assert_eq!(m.key.kind, ResourceKind::new("kpack.io", "v1alpha2", "Image"));
        assert_eq!(m.key.namespace.as_deref(), Some("from-yaml"));
        assert_eq!(m.key.name, "my-image");

        let m = parse_manifest(y, Some("override")).expect("manifest");
        assert_eq!(m.key.namespace.as_deref(), Some("override"));
        assert_eq!(m.json.pointer("/metadata/namespace"), Some(&Json::String("override".into())));
    }

    #[test]
    fn cluster_scoped_manifest_has_no_namespace() {
        let y = "apiVersion: kpack.io/v1alpha2\nkind: ClusterStore\nmetadata:\n  name: my-store\n";
        let m = parse_manifest(y, None).expect("manifest");
        assert_eq!(m.key.namespace, None);
        assert!(m.json.pointer("/metadata/namespace").is_none());
    }

    #[test]
    fn node_budget_is_enforced() {
        let v = serde_json::json!({"a": [1, 2, 3], "b": {"c": true}});
        assert!(!json_node_budget_exceeded(&v, 100));
        assert!(json_node_budget_exceeded(&v, 3));
    }

    #[test]
    fn applied_object_yields_watch_target() {
        let applied = Applied {
            key: ResourceKey::new(ResourceKind::new("kpack.io", "v1alpha2", "Image"), Some("ns"), "my-image"),
            object: serde_json::json!({"metadata": {"name": "my-image", "namespace": "ns", "generation": 4}}),
            dry_run: false,
        };
        let t = applied.watch_target().expect("target");
        assert_eq!(t.generation(), 4);
        assert_eq!(t.namespace(), Some("ns"));
    }
}
