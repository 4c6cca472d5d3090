use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const TEMPLATE_API_VERSION: &str = "tmax.io/v1";

/// A parameter value as stored on templates and instances.
///
/// Kubernetes encodes these as int-or-string, so integers keep their
/// numeric form on the wire and everything else is carried as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

impl ParamValue {
    /// Convert a caller-supplied JSON value. `null` means "not supplied".
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(ParamValue::Str(s.clone())),
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Str(n.to_string()),
            }),
            serde_json::Value::Bool(b) => Some(ParamValue::Str(b.to_string())),
            other => Some(ParamValue::Str(other.to_string())),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            ParamValue::Int(_) => false,
            ParamValue::Str(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    /// Declared default, replaced by the resolved value on instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_value(mut self, value: impl Into<ParamValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanMetadata {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub costs: Option<Cost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl PlanMetadata {
    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty() && self.costs.is_none() && self.display_name.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cost {
    pub amount: i64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fixed parameter values a plan pins, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanSchemas {
    pub service_instance: PlanInstanceSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanInstanceSchema {
    pub create: PlanCreateSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanCreateSchema {
    pub parameters: BTreeMap<String, ParamValue>,
}

/// A plan as declared on a template definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplatePlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "PlanMetadata::is_empty")]
    pub metadata: PlanMetadata,
    pub free: bool,
    pub bindable: bool,
    pub plan_updateable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_polling_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<MaintenanceInfo>,
    pub schemas: PlanSchemas,
}

impl TemplatePlan {
    pub fn fixed_parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.schemas.service_instance.create.parameters
    }

    pub fn with_fixed(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.schemas
            .service_instance
            .create
            .parameters
            .insert(name.into(), value.into());
        self
    }
}

/// Fields shared by Template and ClusterTemplate. They sit inline next to
/// `metadata` rather than under a `spec` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_description: Option<String>,
    #[serde(
        rename = "markdownDescription",
        alias = "markDownDescription",
        skip_serializing_if = "Option::is_none"
    )]
    pub markdown_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    pub recommend: bool,
    pub parameters: Vec<ParamSpec>,
    pub plans: Vec<TemplatePlan>,
    /// Raw manifest objects, each with at least `kind` and `metadata.name`
    pub objects: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default = "template_api_version")]
    pub api_version: String,
    #[serde(default = "template_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub spec: TemplateSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTemplate {
    #[serde(default = "template_api_version")]
    pub api_version: String,
    #[serde(default = "cluster_template_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub spec: TemplateSpec,
}

fn template_api_version() -> String {
    TEMPLATE_API_VERSION.to_string()
}

fn template_kind() -> String {
    "Template".to_string()
}

fn cluster_template_kind() -> String {
    "ClusterTemplate".to_string()
}

impl Template {
    pub fn new(name: &str, namespace: &str, uid: &str, spec: TemplateSpec) -> Self {
        Self {
            api_version: template_api_version(),
            kind: template_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec,
        }
    }
}

impl ClusterTemplate {
    pub fn new(name: &str, uid: &str, spec: TemplateSpec) -> Self {
        Self {
            api_version: template_api_version(),
            kind: cluster_template_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec,
        }
    }
}

/// A template definition of either scope.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateRef {
    Namespaced(Template),
    Cluster(ClusterTemplate),
}

impl TemplateRef {
    fn metadata(&self) -> &ObjectMeta {
        match self {
            TemplateRef::Namespaced(t) => &t.metadata,
            TemplateRef::Cluster(t) => &t.metadata,
        }
    }

    pub fn spec(&self) -> &TemplateSpec {
        match self {
            TemplateRef::Namespaced(t) => &t.spec,
            TemplateRef::Cluster(t) => &t.spec,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TemplateRef::Namespaced(_) => "Template",
            TemplateRef::Cluster(_) => "ClusterTemplate",
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref().filter(|uid| !uid.is_empty())
    }

    /// Broker-facing service id: the UID, or the name when UIDs are unused.
    pub fn service_id(&self) -> &str {
        self.uid().unwrap_or_else(|| self.name())
    }

    pub fn matches_service_id(&self, service_id: &str) -> bool {
        self.service_id() == service_id || self.name() == service_id
    }

    pub fn parameters(&self) -> &[ParamSpec] {
        &self.spec().parameters
    }

    pub fn plans(&self) -> &[TemplatePlan] {
        &self.spec().plans
    }

    pub fn objects(&self) -> &[serde_json::Value] {
        &self.spec().objects
    }
}

impl From<Template> for TemplateRef {
    fn from(template: Template) -> Self {
        TemplateRef::Namespaced(template)
    }
}

impl From<ClusterTemplate> for TemplateRef {
    fn from(template: ClusterTemplate) -> Self {
        TemplateRef::Cluster(template)
    }
}
