use k8s_openapi::api::core::v1::{Secret, Service};
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};
use crate::model::{ClusterTemplate, Template, TemplateInstance};
use crate::store::traits::{InstanceStore, LiveResourceStore, TemplateStore};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct Objects {
    templates: BTreeMap<Key, Template>,
    cluster_templates: BTreeMap<String, ClusterTemplate>,
    instances: BTreeMap<Key, TemplateInstance>,
    services: BTreeMap<Key, Service>,
    secrets: BTreeMap<Key, Secret>,
}

/// In-process resource store.
///
/// All objects sit behind one lock, so create-if-absent is atomic and a
/// created instance is visible to the next read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<Objects>,
}

fn assign_uid(metadata: &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) {
    if metadata.uid.as_deref().map_or(true, str::is_empty) {
        metadata.uid = Some(uuid::Uuid::new_v4().to_string());
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a template. A missing UID is generated.
    pub fn insert_template(&self, mut template: Template) {
        assign_uid(&mut template.metadata);
        let namespace = template.metadata.namespace.clone().unwrap_or_default();
        let name = template.metadata.name.clone().unwrap_or_default();
        self.objects.write().templates.insert((namespace, name), template);
    }

    pub fn insert_cluster_template(&self, mut template: ClusterTemplate) {
        assign_uid(&mut template.metadata);
        let name = template.metadata.name.clone().unwrap_or_default();
        self.objects.write().cluster_templates.insert(name, template);
    }

    pub fn insert_service(&self, service: Service) {
        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        let name = service.metadata.name.clone().unwrap_or_default();
        self.objects.write().services.insert((namespace, name), service);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.objects.write().secrets.insert((namespace, name), secret);
    }

    pub fn instance_count(&self) -> usize {
        self.objects.read().instances.len()
    }
}

#[async_trait::async_trait]
impl TemplateStore for MemoryStore {
    async fn get_template(&self, namespace: &str, name: &str) -> StoreResult<Option<Template>> {
        Ok(self.objects.read().templates.get(&key(namespace, name)).cloned())
    }

    async fn list_templates(&self, namespace: &str) -> StoreResult<Vec<Template>> {
        Ok(self
            .objects
            .read()
            .templates
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, template)| template.clone())
            .collect())
    }

    async fn get_cluster_template(&self, name: &str) -> StoreResult<Option<ClusterTemplate>> {
        Ok(self.objects.read().cluster_templates.get(name).cloned())
    }

    async fn list_cluster_templates(&self) -> StoreResult<Vec<ClusterTemplate>> {
        Ok(self.objects.read().cluster_templates.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl InstanceStore for MemoryStore {
    async fn get_template_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<TemplateInstance>> {
        Ok(self.objects.read().instances.get(&key(namespace, name)).cloned())
    }

    async fn list_template_instances(&self, namespace: &str) -> StoreResult<Vec<TemplateInstance>> {
        Ok(self
            .objects
            .read()
            .instances
            .iter()
            .filter(|((ns, _), _)| namespace.is_empty() || ns == namespace)
            .map(|(_, instance)| instance.clone())
            .collect())
    }

    async fn create_template_instance(&self, instance: &TemplateInstance) -> StoreResult<TemplateInstance> {
        let k = key(instance.namespace(), instance.name());
        let mut objects = self.objects.write();
        if objects.instances.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                kind: "TemplateInstance".to_string(),
                namespace: k.0,
                name: k.1,
            });
        }

        let mut created = instance.clone();
        assign_uid(&mut created.metadata);
        objects.instances.insert(k, created.clone());
        Ok(created)
    }

    async fn delete_template_instance(&self, instance: &TemplateInstance) -> StoreResult<bool> {
        Ok(self
            .objects
            .write()
            .instances
            .remove(&key(instance.namespace(), instance.name()))
            .is_some())
    }
}

#[async_trait::async_trait]
impl LiveResourceStore for MemoryStore {
    async fn get_service(&self, namespace: &str, name: &str) -> StoreResult<Option<Service>> {
        Ok(self.objects.read().services.get(&key(namespace, name)).cloned())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Option<Secret>> {
        Ok(self.objects.read().secrets.get(&key(namespace, name)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceIdentity, TemplateRef, TemplateSpec};

    fn instance(namespace: &str, name: &str) -> TemplateInstance {
        let identity = InstanceIdentity {
            name: name.to_string(),
            namespace: namespace.to_string(),
            logical_name: name.to_string(),
            instance_id: name.to_string(),
            service_id: "svc".to_string(),
            plan_id: "plan".to_string(),
        };
        let template = TemplateRef::from(Template::new("t", namespace, "svc", TemplateSpec::default()));
        TemplateInstance::new(&identity, &template, Vec::new())
    }

    #[tokio::test]
    async fn test_create_is_create_if_absent() {
        let store = MemoryStore::new();
        let created = store.create_template_instance(&instance("ns", "a")).await.unwrap();
        assert!(created.metadata.uid.is_some());

        let err = store.create_template_instance(&instance("ns", "a")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_list_instances_across_namespaces() {
        let store = MemoryStore::new();
        store.create_template_instance(&instance("ns1", "a")).await.unwrap();
        store.create_template_instance(&instance("ns2", "b")).await.unwrap();

        assert_eq!(store.list_template_instances("ns1").await.unwrap().len(), 1);
        assert_eq!(store.list_template_instances("").await.unwrap().len(), 2);

        let b = instance("ns2", "b");
        assert!(store.delete_template_instance(&b).await.unwrap());
        assert!(!store.delete_template_instance(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_template_assigns_uid() {
        let store = MemoryStore::new();
        store.insert_template(Template::new("redis", "default", "", TemplateSpec::default()));
        let template = store.get_template("default", "redis").await.unwrap().unwrap();
        assert!(!template.metadata.uid.unwrap().is_empty());
        assert!(store.list_templates("other").await.unwrap().is_empty());
    }
}
