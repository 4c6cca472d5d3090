use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{ParamSpec, TemplateRef, TEMPLATE_API_VERSION};

/// Back-reference to the logical instance name (OSB `context.instance_name`)
pub const INSTANCE_NAME_LABEL: &str = "templateservicebroker.tmax.io/instance-name";
/// Opaque OSB instance id, the canonical lookup key for deprovision and bind
pub const INSTANCE_ID_ANNOTATION: &str = "templateservicebroker.tmax.io/instance-id";
pub const SERVICE_ID_ANNOTATION: &str = "templateservicebroker.tmax.io/service-id";
pub const PLAN_ID_ANNOTATION: &str = "templateservicebroker.tmax.io/plan-id";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMetadata {
    pub name: String,
}

/// Snapshot of the definition an instance was provisioned from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSource {
    pub metadata: SourceMetadata,
    /// Resolved (post-merge) parameter values
    pub parameters: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateInstanceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<InstanceSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_template: Option<InstanceSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstance {
    #[serde(default = "instance_api_version")]
    pub api_version: String,
    #[serde(default = "instance_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TemplateInstanceSpec,
}

fn instance_api_version() -> String {
    TEMPLATE_API_VERSION.to_string()
}

fn instance_kind() -> String {
    "TemplateInstance".to_string()
}

/// Identity and bookkeeping for a new instance.
#[derive(Debug, Clone)]
pub struct InstanceIdentity {
    pub name: String,
    pub namespace: String,
    pub logical_name: String,
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
}

impl TemplateInstance {
    /// Build an instance of `template` carrying the resolved parameters and a
    /// copy of its manifest objects.
    pub fn new(identity: &InstanceIdentity, template: &TemplateRef, parameters: Vec<ParamSpec>) -> Self {
        let source = InstanceSource {
            metadata: SourceMetadata {
                name: template.name().to_string(),
            },
            parameters,
            objects: template.objects().to_vec(),
        };
        let spec = match template {
            TemplateRef::Namespaced(_) => TemplateInstanceSpec {
                template: Some(source),
                cluster_template: None,
            },
            TemplateRef::Cluster(_) => TemplateInstanceSpec {
                template: None,
                cluster_template: Some(source),
            },
        };

        let labels = BTreeMap::from([(INSTANCE_NAME_LABEL.to_string(), identity.logical_name.clone())]);
        let annotations = BTreeMap::from([
            (INSTANCE_ID_ANNOTATION.to_string(), identity.instance_id.clone()),
            (SERVICE_ID_ANNOTATION.to_string(), identity.service_id.clone()),
            (PLAN_ID_ANNOTATION.to_string(), identity.plan_id.clone()),
        ]);

        Self {
            api_version: instance_api_version(),
            kind: instance_kind(),
            metadata: ObjectMeta {
                name: Some(identity.name.clone()),
                namespace: Some(identity.namespace.clone()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.annotation(INSTANCE_ID_ANNOTATION)
    }

    pub fn source(&self) -> Option<&InstanceSource> {
        self.spec
            .template
            .as_ref()
            .or(self.spec.cluster_template.as_ref())
    }

    /// Manifest objects captured at provision time, in template order.
    pub fn objects(&self) -> &[serde_json::Value] {
        self.source().map(|s| s.objects.as_slice()).unwrap_or_default()
    }

    pub fn parameters(&self) -> &[ParamSpec] {
        self.source().map(|s| s.parameters.as_slice()).unwrap_or_default()
    }
}
