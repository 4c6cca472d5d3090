use k8s_openapi::api::core::v1::{Secret, Service};

use crate::error::StoreResult;
use crate::model::{ClusterTemplate, Template, TemplateInstance};

/// Read access to template definitions
#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_template(&self, namespace: &str, name: &str) -> StoreResult<Option<Template>>;
    async fn list_templates(&self, namespace: &str) -> StoreResult<Vec<Template>>;
    async fn get_cluster_template(&self, name: &str) -> StoreResult<Option<ClusterTemplate>>;
    async fn list_cluster_templates(&self) -> StoreResult<Vec<ClusterTemplate>>;
}

#[async_trait::async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_template_instance(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<TemplateInstance>>;
    /// List instances in `namespace`, or in every namespace when it is empty
    async fn list_template_instances(&self, namespace: &str) -> StoreResult<Vec<TemplateInstance>>;
    /// Create the instance if no object with its name exists.
    ///
    /// Reports `StoreError::AlreadyExists` otherwise; the check and the write
    /// are a single atomic operation.
    async fn create_template_instance(&self, instance: &TemplateInstance) -> StoreResult<TemplateInstance>;
    /// Delete the instance. Returns false if it was already gone.
    async fn delete_template_instance(&self, instance: &TemplateInstance) -> StoreResult<bool>;
}

/// Live resources created from template manifests
#[async_trait::async_trait]
pub trait LiveResourceStore: Send + Sync {
    async fn get_service(&self, namespace: &str, name: &str) -> StoreResult<Option<Service>>;
    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Option<Secret>>;
}

pub trait Store: TemplateStore + InstanceStore + LiveResourceStore + Send + Sync {}

impl<T: TemplateStore + InstanceStore + LiveResourceStore + Send + Sync> Store for T {}
