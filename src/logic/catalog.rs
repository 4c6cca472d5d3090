//! Catalog derivation from template definitions.

use log::warn;
use sha2::{Digest, Sha224};
use std::collections::BTreeMap;

use crate::model::{ParamSpec, Plan, PropertySpec, Service, TemplatePlan, TemplateRef};
use crate::model::{Catalog, ParameterSchema, SchemaParameters, Schemas, ServiceInstanceSchema};

pub fn build_catalog(templates: &[TemplateRef]) -> Catalog {
    Catalog {
        services: templates.iter().map(make_service).collect(),
    }
}

/// Build the broker service entry for one template.
pub fn make_service(template: &TemplateRef) -> Service {
    let spec = template.spec();
    let service_id = template.service_id().to_string();

    let mut metadata = BTreeMap::new();
    metadata.insert(
        "serviceClassRefName".to_string(),
        service_class_ref_name(&service_id).into(),
    );
    let descriptive = [
        ("imageUrl", &spec.image_url),
        ("longDescription", &spec.long_description),
        ("urlDescription", &spec.url_description),
        ("markdownDescription", &spec.markdown_description),
        ("providerDisplayName", &spec.provider),
    ];
    for (key, value) in descriptive {
        if let Some(value) = value {
            metadata.insert(key.to_string(), value.clone().into());
        }
    }
    metadata.insert("categories".to_string(), spec.categories.clone().into());
    metadata.insert("recommend".to_string(), spec.recommend.to_string().into());

    Service {
        name: template.name().to_string(),
        id: service_id,
        description: spec.short_description.clone().unwrap_or_default(),
        tags: spec.tags.clone(),
        requires: Vec::new(),
        bindable: is_bindable(template),
        metadata,
        plan_updateable: false,
        plans: make_plans(template),
    }
}

/// Hex SHA-224 of the service id, used by service catalogs as the class
/// object name.
pub fn service_class_ref_name(service_id: &str) -> String {
    hex::encode(Sha224::digest(service_id.as_bytes()))
}

/// A template is bindable when a manifest object is a Service or Secret.
///
/// The scan stops at the first object whose kind cannot be read; objects
/// after it are not considered.
pub fn is_bindable(template: &TemplateRef) -> bool {
    for (index, object) in template.objects().iter().enumerate() {
        let Some(kind) = object.get("kind").and_then(|kind| kind.as_str()) else {
            warn!(
                "{} {}: cannot read kind of manifest object #{}, bindability check stopped",
                template.kind(),
                template.name(),
                index
            );
            break;
        };
        if kind.contains("Service") || kind.contains("Secret") {
            return true;
        }
    }
    false
}

fn template_properties(parameters: &[ParamSpec]) -> (BTreeMap<String, PropertySpec>, Vec<String>) {
    let properties = parameters
        .iter()
        .map(|param| {
            let property = PropertySpec {
                default: param.value.clone(),
                fixed: false,
                description: param.description.clone(),
                value_type: param.value_type.clone(),
                regex: param.regex.clone(),
            };
            (param.name.clone(), property)
        })
        .collect();
    let required = parameters
        .iter()
        .filter(|param| param.required)
        .map(|param| param.name.clone())
        .collect();
    (properties, required)
}

fn schemas(properties: BTreeMap<String, PropertySpec>, required: Vec<String>) -> Schemas {
    Schemas {
        service_instance: ServiceInstanceSchema {
            create: SchemaParameters {
                parameters: ParameterSchema { properties, required },
            },
        },
    }
}

fn make_plans(template: &TemplateRef) -> Vec<Plan> {
    let (properties, required) = template_properties(template.parameters());

    if template.plans().is_empty() {
        let name = format!("{}-plan-default", template.name());
        return vec![Plan {
            id: format!("{}-plan-default", template.service_id()),
            description: name.clone(),
            name,
            free: true,
            schemas: schemas(properties, required),
            ..Default::default()
        }];
    }

    template
        .plans()
        .iter()
        .enumerate()
        .map(|(index, plan)| make_plan(template, index, plan, &properties, &required))
        .collect()
}

fn make_plan(
    template: &TemplateRef,
    index: usize,
    plan: &TemplatePlan,
    properties: &BTreeMap<String, PropertySpec>,
    required: &[String],
) -> Plan {
    let fixed = plan.fixed_parameters();
    let plan_properties = properties
        .iter()
        .map(|(key, property)| {
            let mut property = property.clone();
            if let Some(value) = fixed.get(key) {
                property.default = Some(value.clone());
                property.fixed = true;
            }
            (key.clone(), property)
        })
        .collect();

    let fallback = format!("{}-plan-{}", template.name(), index);
    let or_fallback = |value: &str| {
        if value.is_empty() {
            fallback.clone()
        } else {
            value.to_string()
        }
    };

    Plan {
        id: format!("{}-{}", template.service_id(), index),
        name: or_fallback(&plan.name),
        description: or_fallback(&plan.description),
        metadata: plan.metadata.clone(),
        free: plan.free,
        bindable: plan.bindable,
        plan_updateable: plan.plan_updateable,
        schemas: schemas(plan_properties, required.to_vec()),
        maximum_polling_duration: plan.maximum_polling_duration,
        maintenance_info: plan.maintenance_info.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamValue, Template, TemplateSpec};
    use serde_json::json;

    fn template(parameters: Vec<ParamSpec>, plans: Vec<TemplatePlan>, objects: Vec<serde_json::Value>) -> TemplateRef {
        let spec = TemplateSpec {
            short_description: Some("Redis cache".to_string()),
            parameters,
            plans,
            objects,
            ..Default::default()
        };
        TemplateRef::from(Template::new("redis", "default", "uid-1", spec))
    }

    #[test]
    fn test_zero_plans_synthesizes_default_plan() {
        let t = template(
            vec![ParamSpec::new("PASSWORD").required(), ParamSpec::new("PORT").with_value(6379)],
            Vec::new(),
            Vec::new(),
        );
        let service = make_service(&t);

        assert_eq!(service.id, "uid-1");
        assert_eq!(service.description, "Redis cache");
        assert_eq!(service.plans.len(), 1);
        let plan = &service.plans[0];
        assert_eq!(plan.name, "redis-plan-default");
        assert_eq!(plan.id, "uid-1-plan-default");

        let schema = plan.parameter_schema();
        assert_eq!(schema.properties.len(), 2);
        assert!(schema.properties.values().all(|p| !p.fixed));
        assert_eq!(schema.properties["PORT"].default, Some(ParamValue::Int(6379)));
        assert_eq!(schema.required, vec!["PASSWORD".to_string()]);
    }

    #[test]
    fn test_declared_plans_mark_fixed_keys() {
        let plans = vec![
            TemplatePlan {
                name: "small".to_string(),
                ..Default::default()
            }
            .with_fixed("MEMORY", "1Gi"),
            TemplatePlan::default(),
        ];
        let t = template(
            vec![ParamSpec::new("MEMORY").with_value("512Mi"), ParamSpec::new("PASSWORD")],
            plans,
            Vec::new(),
        );
        let service = make_service(&t);

        assert_eq!(service.plans.len(), 2);
        assert_eq!(service.plans[0].id, "uid-1-0");
        assert_eq!(service.plans[1].id, "uid-1-1");

        let small = service.plans[0].parameter_schema();
        assert_eq!(small.properties.len(), 2);
        assert!(small.properties["MEMORY"].fixed);
        assert_eq!(small.properties["MEMORY"].default, Some("1Gi".into()));
        assert!(!small.properties["PASSWORD"].fixed);

        let unnamed = &service.plans[1];
        assert_eq!(unnamed.name, "redis-plan-1");
        assert_eq!(unnamed.description, "redis-plan-1");
        let unnamed_schema = unnamed.parameter_schema();
        assert!(!unnamed_schema.properties["MEMORY"].fixed);
        assert_eq!(unnamed_schema.properties["MEMORY"].default, Some("512Mi".into()));
    }

    #[test]
    fn test_bindable_by_kind_substring() {
        let secret = template(Vec::new(), Vec::new(), vec![json!({"kind": "Deployment"}), json!({"kind": "Secret"})]);
        assert!(make_service(&secret).bindable);

        let account = template(Vec::new(), Vec::new(), vec![json!({"kind": "ServiceAccount"})]);
        assert!(is_bindable(&account));

        let lowercase = template(Vec::new(), Vec::new(), vec![json!({"kind": "service"})]);
        assert!(!is_bindable(&lowercase));
    }

    #[test]
    fn test_malformed_kind_is_not_bindable() {
        let t = template(Vec::new(), Vec::new(), vec![json!({"kind": 42}), json!("garbage")]);
        assert!(!is_bindable(&t));

        let unreadable_first =
            template(Vec::new(), Vec::new(), vec![json!({"metadata": {}}), json!({"kind": "Service"})]);
        assert!(!is_bindable(&unreadable_first));

        let bindable_first =
            template(Vec::new(), Vec::new(), vec![json!({"kind": "Secret"}), json!({"metadata": {}})]);
        assert!(is_bindable(&bindable_first));
    }

    #[test]
    fn test_service_metadata() {
        let t = template(Vec::new(), Vec::new(), Vec::new());
        let service = make_service(&t);
        let ref_name = service.metadata["serviceClassRefName"].as_str().unwrap();
        assert_eq!(ref_name.len(), 56);
        assert_eq!(ref_name, service_class_ref_name("uid-1"));
        assert_eq!(service.metadata["recommend"], "false");
        assert!(!service.bindable);
    }

    #[test]
    fn test_build_catalog_keeps_order() {
        let a = template(Vec::new(), Vec::new(), Vec::new());
        let b = TemplateRef::from(Template::new("mysql", "default", "uid-2", TemplateSpec::default()));
        let catalog = build_catalog(&[a, b]);
        let ids: Vec<_> = catalog.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["uid-1", "uid-2"]);
    }
}
