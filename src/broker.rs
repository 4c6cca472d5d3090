//! Broker facade shared by all request handlers.
//!
//! Built once at startup from the store client and deployment settings.
//! Holds no mutable state; template definitions are read fresh per request.

use log::info;
use std::sync::Arc;

use crate::config::{AppConfig, BrokerScope, ConflictPolicy, NamingStrategy};
use crate::error::{BrokerError, Result};
use crate::logic::{build_catalog, resolve_binding, InstanceLifecycle};
use crate::model::{
    BindingRequest, BindingResponse, Catalog, DeprovisionQuery, ProvisionRequest, RequestContext,
    TemplateInstance, TemplateRef,
};
use crate::store::traits::Store;

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub scope: BrokerScope,
    pub naming: NamingStrategy,
    pub on_conflict: ConflictPolicy,
    /// Operating namespace
    pub namespace: String,
}

impl BrokerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            scope: config.broker.scope,
            naming: config.broker.naming,
            on_conflict: config.broker.on_conflict,
            namespace: config.namespace()?,
        })
    }
}

pub struct Broker<S: Store> {
    store: Arc<S>,
    settings: BrokerSettings,
}

impl<S: Store> Broker<S> {
    pub fn new(store: Arc<S>, settings: BrokerSettings) -> Self {
        info!(
            "broker scope={:?} naming={:?} on_conflict={:?} namespace={}",
            settings.scope, settings.naming, settings.on_conflict, settings.namespace
        );
        Self { store, settings }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lifecycle(&self) -> InstanceLifecycle<'_, S> {
        let lifecycle =
            InstanceLifecycle::new(self.store.as_ref(), self.settings.naming, self.settings.on_conflict);
        match self.settings.scope {
            BrokerScope::Namespaced => lifecycle,
            BrokerScope::Cluster => lifecycle.cluster_wide(),
        }
    }

    async fn templates(&self) -> Result<Vec<TemplateRef>> {
        let templates = match self.settings.scope {
            BrokerScope::Namespaced => self
                .store
                .list_templates(&self.settings.namespace)
                .await?
                .into_iter()
                .map(TemplateRef::from)
                .collect(),
            BrokerScope::Cluster => self
                .store
                .list_cluster_templates()
                .await?
                .into_iter()
                .map(TemplateRef::from)
                .collect(),
        };
        Ok(templates)
    }

    async fn find_template(&self, service_id: &str) -> Result<TemplateRef> {
        self.templates()
            .await?
            .into_iter()
            .find(|template| template.matches_service_id(service_id))
            .ok_or_else(|| BrokerError::TemplateNotFound(service_id.to_string()))
    }

    /// Namespace new instances are created in
    fn target_namespace(&self, context: &RequestContext) -> String {
        match self.settings.scope {
            BrokerScope::Cluster if !context.namespace.trim().is_empty() => context.namespace.trim().to_string(),
            _ => self.settings.namespace.clone(),
        }
    }

    /// Namespace searched for existing instances; empty means all
    fn lookup_namespace(&self, context: Option<&RequestContext>) -> String {
        match self.settings.scope {
            BrokerScope::Namespaced => self.settings.namespace.clone(),
            BrokerScope::Cluster => context
                .map(|ctx| ctx.namespace.trim().to_string())
                .unwrap_or_default(),
        }
    }

    pub async fn catalog(&self) -> Result<Catalog> {
        let templates = self.templates().await?;
        Ok(build_catalog(&templates))
    }

    pub async fn provision(&self, instance_id: &str, request: &ProvisionRequest) -> Result<TemplateInstance> {
        if request.service_id.is_empty() || request.plan_id.is_empty() {
            return Err(BrokerError::InvalidRequest(
                "service_id and plan_id are required".to_string(),
            ));
        }
        let template = self.find_template(&request.service_id).await?;
        let namespace = self.target_namespace(&request.context);
        self.lifecycle()
            .provision(&template, &namespace, request, instance_id)
            .await
    }

    pub async fn deprovision(&self, instance_id: &str, query: &DeprovisionQuery) -> Result<()> {
        let namespace = self.lookup_namespace(None);
        self.lifecycle()
            .deprovision(
                &namespace,
                query.service_id.as_deref(),
                query.plan_id.as_deref(),
                instance_id,
            )
            .await?;
        Ok(())
    }

    pub async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        request: &BindingRequest,
    ) -> Result<BindingResponse> {
        let namespace = self.lookup_namespace(Some(&request.context));
        let instance = self
            .lifecycle()
            .find_instance(&namespace, instance_id)
            .await?
            .ok_or_else(|| BrokerError::InstanceNotFound(instance_id.to_string()))?;

        info!(
            "binding {} to template instance {}/{}",
            binding_id,
            instance.namespace(),
            instance.name()
        );
        resolve_binding(self.store.as_ref(), &instance, instance.namespace()).await
    }
}
