//! Resource store backed by the Kubernetes API server.
//!
//! Template kinds are served through the dynamic API so their inline spec
//! layout is preserved exactly; Service and Secret use the typed core/v1 API.

use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::model::{ClusterTemplate, Template, TemplateInstance};
use crate::store::traits::{InstanceStore, LiveResourceStore, TemplateStore};

const GROUP: &str = "tmax.io";
const VERSION: &str = "v1";

fn api_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: GROUP.to_string(),
        version: VERSION.to_string(),
        api_version: format!("{}/{}", GROUP, VERSION),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

fn from_dynamic<T: DeserializeOwned>(kind: &str, obj: DynamicObject) -> StoreResult<T> {
    let value = serde_json::to_value(obj).map_err(|e| StoreError::serialization(kind, e))?;
    serde_json::from_value(value).map_err(|e| StoreError::serialization(kind, e))
}

/// Decode listed objects, skipping (with a warning) any that do not parse so
/// one bad object cannot hide the rest.
fn decode_items<T: DeserializeOwned>(kind: &str, items: Vec<DynamicObject>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|obj| {
            let name = obj.metadata.name.clone().unwrap_or_default();
            let namespace = obj.metadata.namespace.clone().unwrap_or_default();
            match from_dynamic(kind, obj) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("skipping {} {}/{}: {}", kind, namespace, name, e);
                    None
                }
            }
        })
        .collect()
}

fn to_dynamic<T: Serialize>(kind: &str, obj: &T) -> StoreResult<DynamicObject> {
    let value = serde_json::to_value(obj).map_err(|e| StoreError::serialization(kind, e))?;
    serde_json::from_value(value).map_err(|e| StoreError::serialization(kind, e))
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    templates: ApiResource,
    cluster_templates: ApiResource,
    instances: ApiResource,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            templates: api_resource("Template", "templates"),
            cluster_templates: api_resource("ClusterTemplate", "clustertemplates"),
            instances: api_resource("TemplateInstance", "templateinstances"),
        }
    }

    /// Connect using in-cluster config or the local kubeconfig.
    pub async fn try_default() -> StoreResult<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn dynamic_api(&self, ar: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        if namespace.is_empty() {
            Api::all_with(self.client.clone(), ar)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, ar)
        }
    }

    async fn get_dynamic<T: DeserializeOwned>(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<T>> {
        match self.dynamic_api(ar, namespace).get_opt(name).await? {
            Some(obj) => Ok(Some(from_dynamic(&ar.kind, obj)?)),
            None => Ok(None),
        }
    }

    async fn list_dynamic<T: DeserializeOwned>(&self, ar: &ApiResource, namespace: &str) -> StoreResult<Vec<T>> {
        let list = self.dynamic_api(ar, namespace).list(&ListParams::default()).await?;
        Ok(decode_items(&ar.kind, list.items))
    }
}

#[async_trait::async_trait]
impl TemplateStore for KubeStore {
    async fn get_template(&self, namespace: &str, name: &str) -> StoreResult<Option<Template>> {
        self.get_dynamic(&self.templates, namespace, name).await
    }

    async fn list_templates(&self, namespace: &str) -> StoreResult<Vec<Template>> {
        self.list_dynamic(&self.templates, namespace).await
    }

    async fn get_cluster_template(&self, name: &str) -> StoreResult<Option<ClusterTemplate>> {
        self.get_dynamic(&self.cluster_templates, "", name).await
    }

    async fn list_cluster_templates(&self) -> StoreResult<Vec<ClusterTemplate>> {
        self.list_dynamic(&self.cluster_templates, "").await
    }
}

#[async_trait::async_trait]
impl InstanceStore for KubeStore {
    async fn get_template_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<TemplateInstance>> {
        self.get_dynamic(&self.instances, namespace, name).await
    }

    async fn list_template_instances(&self, namespace: &str) -> StoreResult<Vec<TemplateInstance>> {
        self.list_dynamic(&self.instances, namespace).await
    }

    async fn create_template_instance(&self, instance: &TemplateInstance) -> StoreResult<TemplateInstance> {
        let obj = to_dynamic(&self.instances.kind, instance)?;
        let api = self.dynamic_api(&self.instances, instance.namespace());

        match api.create(&PostParams::default(), &obj).await {
            Ok(created) => from_dynamic(&self.instances.kind, created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(StoreError::AlreadyExists {
                kind: self.instances.kind.clone(),
                namespace: instance.namespace().to_string(),
                name: instance.name().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_template_instance(&self, instance: &TemplateInstance) -> StoreResult<bool> {
        let api = self.dynamic_api(&self.instances, instance.namespace());
        match api.delete(instance.name(), &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(
                    "template instance {}/{} already deleted",
                    instance.namespace(),
                    instance.name()
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl LiveResourceStore for KubeStore {
    async fn get_service(&self, namespace: &str, name: &str) -> StoreResult<Option<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
