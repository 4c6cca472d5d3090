//! Seeding the in-memory store from a manifest file.
//!
//! The file is YAML (JSON parses as YAML too) holding either a list of
//! objects or a `List`-style document with an `items` array. Objects are
//! dispatched on `kind`; unknown kinds are skipped with a warning.

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::{Secret, Service};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

use crate::model::{ClusterTemplate, Template};
use crate::store::MemoryStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub templates: usize,
    pub cluster_templates: usize,
    pub services: usize,
    pub secrets: usize,
    pub skipped: usize,
}

/// Load the seed file at `path` into `store`.
pub fn load_seed_file(store: &MemoryStore, path: &Path, default_namespace: &str) -> Result<SeedSummary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let summary = load_seed_str(store, &content, default_namespace)
        .with_context(|| format!("loading seed file {}", path.display()))?;
    info!(
        "seeded {} templates, {} cluster templates, {} services, {} secrets from {}",
        summary.templates,
        summary.cluster_templates,
        summary.services,
        summary.secrets,
        path.display()
    );
    Ok(summary)
}

/// Load seed objects from YAML or JSON text. Namespaced objects without a
/// namespace are placed in `default_namespace`.
pub fn load_seed_str(store: &MemoryStore, content: &str, default_namespace: &str) -> Result<SeedSummary> {
    let document: Value = serde_yaml::from_str(content).context("parsing seed document")?;
    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => return Err(anyhow!("seed document must be a list or carry an items list")),
        },
        Value::Null => Vec::new(),
        _ => return Err(anyhow!("seed document must be a list or carry an items list")),
    };

    let mut summary = SeedSummary::default();
    for (index, mut item) in items.into_iter().enumerate() {
        let kind = item
            .get("kind")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();

        match kind.as_str() {
            "Template" => {
                default_namespace_of(&mut item, default_namespace);
                store.insert_template(parse::<Template>(index, &kind, item)?);
                summary.templates += 1;
            }
            "ClusterTemplate" => {
                store.insert_cluster_template(parse::<ClusterTemplate>(index, &kind, item)?);
                summary.cluster_templates += 1;
            }
            "Service" => {
                default_namespace_of(&mut item, default_namespace);
                store.insert_service(parse::<Service>(index, &kind, item)?);
                summary.services += 1;
            }
            "Secret" => {
                default_namespace_of(&mut item, default_namespace);
                store.insert_secret(parse::<Secret>(index, &kind, item)?);
                summary.secrets += 1;
            }
            other => {
                warn!("seed item {} has unsupported kind {:?}, skipping", index, other);
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}

fn parse<T: DeserializeOwned>(index: usize, kind: &str, item: Value) -> Result<T> {
    serde_json::from_value(item).with_context(|| format!("seed item {} is not a valid {}", index, kind))
}

fn default_namespace_of(item: &mut Value, namespace: &str) {
    let Some(object) = item.as_object_mut() else {
        return;
    };
    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Default::default()));
    if let Some(metadata) = metadata.as_object_mut() {
        let missing = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .map_or(true, str::is_empty);
        if missing {
            metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::{LiveResourceStore, TemplateStore};

    const SEED: &str = r#"
items:
  - apiVersion: tmax.io/v1
    kind: Template
    metadata:
      name: redis
      uid: redis-uid
    shortDescription: Redis cache
    parameters:
      - name: PASSWORD
        required: true
    objects:
      - kind: Secret
        metadata:
          name: redis-creds
  - apiVersion: tmax.io/v1
    kind: ClusterTemplate
    metadata:
      name: kafka
  - apiVersion: v1
    kind: Secret
    metadata:
      name: redis-creds
      namespace: team-a
    data:
      password: YWJjMTIz
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: ignored
"#;

    #[tokio::test]
    async fn test_load_yaml_list_document() {
        let store = MemoryStore::new();
        let summary = load_seed_str(&store, SEED, "default").unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                templates: 1,
                cluster_templates: 1,
                services: 0,
                secrets: 1,
                skipped: 1,
            }
        );

        let template = store.get_template("default", "redis").await.unwrap().unwrap();
        assert_eq!(template.spec.short_description.as_deref(), Some("Redis cache"));
        assert!(template.spec.parameters[0].required);

        // Cluster templates without a UID get one generated
        let kafka = store.get_cluster_template("kafka").await.unwrap().unwrap();
        assert!(kafka.metadata.uid.is_some());

        let secret = store.get_secret("team-a", "redis-creds").await.unwrap().unwrap();
        let data = secret.data.unwrap();
        assert_eq!(data["password"].0, b"abc123".to_vec());
    }

    #[test]
    fn test_load_json_array() {
        let store = MemoryStore::new();
        let summary = load_seed_str(
            &store,
            r#"[{"kind": "Service", "metadata": {"name": "web"}, "spec": {"type": "LoadBalancer"}}]"#,
            "default",
        )
        .unwrap();
        assert_eq!(summary.services, 1);
    }

    #[test]
    fn test_invalid_document() {
        let store = MemoryStore::new();
        assert!(load_seed_str(&store, "kind: Template", "default").is_err());
        assert!(load_seed_str(&store, "[{kind: Template, metadata: []}]", "default").is_err());
    }
}
