//! Template instance lifecycle: naming, provision and deprovision.
//!
//! The instance-id annotation is the canonical identity for lookups under
//! every naming strategy. The object name only serves as the store's
//! uniqueness key.

use itertools::Itertools;
use log::{info, warn};

use crate::config::{ConflictPolicy, NamingStrategy};
use crate::error::{BrokerError, Result, StoreError};
use crate::logic::parameters::{merge_parameters, resolve_plan};
use crate::model::{
    InstanceIdentity, ProvisionRequest, TemplateInstance, TemplateRef, PLAN_ID_ANNOTATION,
    SERVICE_ID_ANNOTATION,
};
use crate::store::traits::Store;

const MAX_LABEL_VALUE_LEN: usize = 63;

/// Compute the store name for a new instance.
pub fn instance_name(strategy: NamingStrategy, request: &ProvisionRequest, instance_id: &str) -> Result<String> {
    match strategy {
        NamingStrategy::Deterministic => Ok([
            request.service_id.as_str(),
            request.plan_id.as_str(),
            instance_id,
        ]
        .iter()
        .join(".")
        .to_lowercase()),
        NamingStrategy::InstanceName => {
            let name = request.context.instance_name.trim();
            if name.is_empty() {
                return Err(BrokerError::InvalidRequest(
                    "context.instance_name is required".to_string(),
                ));
            }
            Ok(name.to_string())
        }
    }
}

/// Label-safe logical name: the caller's instance name, else the instance id.
///
/// Label values allow ASCII alphanumerics, `-`, `_` and `.`, must start and
/// end alphanumeric and fit in 63 bytes. Anything else becomes `-`.
fn logical_name(request: &ProvisionRequest, instance_id: &str) -> String {
    let name = request.context.instance_name.trim();
    let name = if name.is_empty() { instance_id } else { name };
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .take(MAX_LABEL_VALUE_LEN)
        .collect();
    sanitized
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

pub struct InstanceLifecycle<'a, S: Store + ?Sized> {
    store: &'a S,
    naming: NamingStrategy,
    on_conflict: ConflictPolicy,
    cluster_wide: bool,
}

impl<'a, S: Store + ?Sized> InstanceLifecycle<'a, S> {
    pub fn new(store: &'a S, naming: NamingStrategy, on_conflict: ConflictPolicy) -> Self {
        Self {
            store,
            naming,
            on_conflict,
            cluster_wide: false,
        }
    }

    /// Check instance id uniqueness across every namespace instead of only
    /// the target namespace.
    pub fn cluster_wide(mut self) -> Self {
        self.cluster_wide = true;
        self
    }

    /// Create the instance for `instance_id` in `namespace`.
    ///
    /// An instance id maps to at most one instance: an existing instance with
    /// the same id is only returned (under `ReturnExisting`) when the request
    /// is identical, otherwise provisioning conflicts.
    pub async fn provision(
        &self,
        template: &TemplateRef,
        namespace: &str,
        request: &ProvisionRequest,
        instance_id: &str,
    ) -> Result<TemplateInstance> {
        let plan = resolve_plan(template, &request.plan_id)?;
        let parameters = merge_parameters(template.parameters(), &request.parameters, plan)?;

        let identity = InstanceIdentity {
            name: instance_name(self.naming, request, instance_id)?,
            namespace: namespace.to_string(),
            logical_name: logical_name(request, instance_id),
            instance_id: instance_id.to_string(),
            service_id: request.service_id.clone(),
            plan_id: request.plan_id.clone(),
        };
        info!("service instance name: {}/{}", identity.namespace, identity.name);

        let scan_namespace = if self.cluster_wide { "" } else { namespace };
        if let Some(existing) = self.find_instance(scan_namespace, instance_id).await? {
            return self.on_existing(&identity, existing);
        }

        let instance = TemplateInstance::new(&identity, template, parameters);
        match self.store.create_template_instance(&instance).await {
            Ok(created) => {
                info!(
                    "created template instance {}/{} from {} {}",
                    namespace,
                    identity.name,
                    template.kind(),
                    template.name()
                );
                Ok(created)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                let existing = self
                    .store
                    .get_template_instance(&identity.namespace, &identity.name)
                    .await?
                    .ok_or_else(|| BrokerError::InstanceConflict {
                        namespace: identity.namespace.clone(),
                        name: identity.name.clone(),
                    })?;
                self.on_existing(&identity, existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn on_existing(&self, identity: &InstanceIdentity, existing: TemplateInstance) -> Result<TemplateInstance> {
        let identical = existing.namespace() == identity.namespace
            && existing.name() == identity.name
            && existing.instance_id() == Some(identity.instance_id.as_str())
            && existing.annotation(SERVICE_ID_ANNOTATION) == Some(identity.service_id.as_str())
            && existing.annotation(PLAN_ID_ANNOTATION) == Some(identity.plan_id.as_str());

        if self.on_conflict == ConflictPolicy::Conflict || !identical {
            return Err(BrokerError::InstanceConflict {
                namespace: existing.namespace().to_string(),
                name: existing.name().to_string(),
            });
        }
        info!(
            "template instance {}/{} already exists, returning it",
            identity.namespace, identity.name
        );
        Ok(existing)
    }

    /// Find the instance carrying `instance_id`. An empty namespace searches
    /// every namespace.
    pub async fn find_instance(&self, namespace: &str, instance_id: &str) -> Result<Option<TemplateInstance>> {
        let instances = self.store.list_template_instances(namespace).await?;
        let mut matching = instances
            .into_iter()
            .filter(|instance| instance.instance_id() == Some(instance_id));
        let found = matching.next();
        if let Some(extra) = matching.next() {
            warn!(
                "more than one template instance carries instance id {}, also found {}/{}",
                instance_id,
                extra.namespace(),
                extra.name()
            );
        }
        Ok(found)
    }

    /// Delete the instance for `instance_id`. A missing instance is success.
    ///
    /// Returns whether an instance was deleted.
    pub async fn deprovision(
        &self,
        namespace: &str,
        service_id: Option<&str>,
        plan_id: Option<&str>,
        instance_id: &str,
    ) -> Result<bool> {
        let Some(instance) = self.find_instance(namespace, instance_id).await? else {
            info!("no template instance for service instance {}, nothing to delete", instance_id);
            return Ok(false);
        };

        let recorded_service = instance.annotation(SERVICE_ID_ANNOTATION);
        let recorded_plan = instance.annotation(PLAN_ID_ANNOTATION);
        if service_id.is_some_and(|id| Some(id) != recorded_service) || plan_id.is_some_and(|id| Some(id) != recorded_plan) {
            warn!(
                "deprovision of {} names service {:?} plan {:?}, instance was provisioned with {:?} {:?}",
                instance_id, service_id, plan_id, recorded_service, recorded_plan
            );
        }

        let deleted = self.store.delete_template_instance(&instance).await?;
        info!(
            "deleted template instance {}/{} for service instance {}",
            instance.namespace(),
            instance.name(),
            instance_id
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamSpec, ParamValue, RequestContext, Template, TemplateSpec};
    use crate::store::traits::InstanceStore;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn template() -> TemplateRef {
        let spec = TemplateSpec {
            parameters: vec![ParamSpec::new("PASSWORD").required()],
            objects: vec![json!({"kind": "Secret", "metadata": {"name": "creds"}})],
            ..Default::default()
        };
        TemplateRef::from(Template::new("redis", "default", "svc-uid", spec))
    }

    fn request(instance_name: &str) -> ProvisionRequest {
        ProvisionRequest {
            service_id: "svc-uid".to_string(),
            plan_id: "svc-uid-plan-default".to_string(),
            context: RequestContext {
                instance_name: instance_name.to_string(),
                ..Default::default()
            },
            parameters: [("PASSWORD".to_string(), json!("secret"))].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_deterministic_name() {
        let name = instance_name(NamingStrategy::Deterministic, &request(""), "Inst-1").unwrap();
        assert_eq!(name, "svc-uid.svc-uid-plan-default.inst-1");
    }

    #[test]
    fn test_instance_name_strategy_requires_name() {
        assert_eq!(
            instance_name(NamingStrategy::InstanceName, &request("my-redis"), "inst-1").unwrap(),
            "my-redis"
        );
        let err = instance_name(NamingStrategy::InstanceName, &request(" "), "inst-1").unwrap_err();
        assert!(matches!(err, BrokerError::InvalidRequest(_)));
    }

    #[test]
    fn test_logical_name_is_label_safe() {
        let long = format!("{}-", "a".repeat(70));
        let name = logical_name(&request(&long), "inst");
        assert_eq!(name.len(), 63);
        assert_eq!(logical_name(&request(""), "inst-1"), "inst-1");

        assert_eq!(logical_name(&request("my redis db"), "inst"), "my-redis-db");
        assert_eq!(logical_name(&request("_cache_"), "inst"), "cache");

        // Multi-byte characters are replaced, so the byte limit holds
        let name = logical_name(&request(&"ü".repeat(70)), "inst");
        assert!(name.len() <= 63);
        let name = logical_name(&request(&format!("db{}", "é".repeat(70))), "inst");
        assert_eq!(name, "db");
    }

    #[tokio::test]
    async fn test_provision_embeds_resolved_parameters() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::Conflict);

        let instance = lifecycle
            .provision(&template(), "default", &request("my-redis"), "inst-1")
            .await
            .unwrap();

        assert_eq!(instance.instance_id(), Some("inst-1"));
        assert_eq!(instance.parameters()[0].value, Some(ParamValue::Str("secret".into())));
        assert_eq!(instance.objects().len(), 1);
        let stored = store
            .get_template_instance("default", instance.name())
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_missing_required_leaves_no_instance() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::Conflict);
        let mut req = request("");
        req.parameters.clear();

        let err = lifecycle.provision(&template(), "default", &req, "inst-1").await.unwrap_err();
        assert!(matches!(err, BrokerError::MissingRequiredParameter(_)));
        assert_eq!(store.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_reprovision_conflict_policy() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::Conflict);
        lifecycle.provision(&template(), "default", &request(""), "inst-1").await.unwrap();

        let err = lifecycle
            .provision(&template(), "default", &request(""), "inst-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InstanceConflict { .. }));
        assert_eq!(store.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_reprovision_return_existing_policy() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::InstanceName, ConflictPolicy::ReturnExisting);
        let first = lifecycle.provision(&template(), "default", &request("my-redis"), "inst-1").await.unwrap();

        let again = lifecycle.provision(&template(), "default", &request("my-redis"), "inst-1").await.unwrap();
        assert_eq!(again.metadata.uid, first.metadata.uid);

        // Same name, different instance id
        let err = lifecycle
            .provision(&template(), "default", &request("my-redis"), "inst-2")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InstanceConflict { .. }));
    }

    #[tokio::test]
    async fn test_deprovision_never_provisioned_is_success() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::Conflict);
        assert!(!lifecycle.deprovision("default", None, None, "ghost").await.unwrap());
        assert!(!lifecycle.deprovision("", Some("svc"), Some("plan"), "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_deprovision_finds_instance_by_annotation() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::InstanceName, ConflictPolicy::Conflict);
        lifecycle.provision(&template(), "team-a", &request("my-redis"), "inst-1").await.unwrap();

        // Unknown namespace: scan everything
        assert!(lifecycle.deprovision("", None, None, "inst-1").await.unwrap());
        assert_eq!(store.instance_count(), 0);
        // Second delete is a no-op
        assert!(!lifecycle.deprovision("", None, None, "inst-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_deprovision_scoped_to_namespace() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::Conflict);
        lifecycle.provision(&template(), "team-a", &request(""), "inst-1").await.unwrap();

        assert!(!lifecycle.deprovision("team-b", None, None, "inst-1").await.unwrap());
        assert_eq!(store.instance_count(), 1);
        assert!(lifecycle.deprovision("team-a", None, None, "inst-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_same_instance_id_different_plan_conflicts() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::Conflict);
        lifecycle.provision(&template(), "default", &request(""), "inst-1").await.unwrap();

        let mut other_plan = request("");
        other_plan.plan_id = "svc-uid-1".to_string();
        let err = lifecycle
            .provision(&template(), "default", &other_plan, "inst-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InstanceConflict { .. }));
        assert_eq!(store.instance_count(), 1);

        assert!(lifecycle.deprovision("default", None, None, "inst-1").await.unwrap());
        assert_eq!(store.instance_count(), 0);
    }

    #[tokio::test]
    async fn test_same_instance_id_different_instance_name_conflicts() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::InstanceName, ConflictPolicy::ReturnExisting);
        lifecycle.provision(&template(), "default", &request("my-redis"), "inst-1").await.unwrap();

        let err = lifecycle
            .provision(&template(), "default", &request("other-redis"), "inst-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InstanceConflict { ref name, .. } if name == "my-redis"));
        assert_eq!(store.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_return_existing_requires_identical_request() {
        let store = MemoryStore::new();
        let lifecycle = InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::ReturnExisting);
        let first = lifecycle.provision(&template(), "default", &request(""), "inst-1").await.unwrap();

        let again = lifecycle.provision(&template(), "default", &request(""), "inst-1").await.unwrap();
        assert_eq!(again.metadata.uid, first.metadata.uid);

        let mut other_plan = request("");
        other_plan.plan_id = "svc-uid-1".to_string();
        let err = lifecycle
            .provision(&template(), "default", &other_plan, "inst-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InstanceConflict { .. }));
        assert_eq!(store.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_cluster_wide_uniqueness() {
        let store = MemoryStore::new();
        let lifecycle =
            InstanceLifecycle::new(&store, NamingStrategy::Deterministic, ConflictPolicy::Conflict).cluster_wide();
        lifecycle.provision(&template(), "team-a", &request(""), "inst-1").await.unwrap();

        let err = lifecycle
            .provision(&template(), "team-b", &request(""), "inst-1")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InstanceConflict { ref namespace, .. } if namespace == "team-a"));
        assert_eq!(store.instance_count(), 1);
    }
}
