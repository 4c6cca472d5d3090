//! Plan lookup and parameter merging for provision requests.

use log::{debug, warn};
use regex::Regex;
use std::collections::BTreeMap;

use crate::error::{BrokerError, Result};
use crate::model::{ParamSpec, ParamValue, TemplatePlan, TemplateRef};

/// Resolve `plan_id` against the template's declared plans.
///
/// Plan ids are `{templateUID}-{index}`. A template without declared plans
/// accepts any plan id and resolves to `None`, the default plan.
pub fn resolve_plan<'a>(template: &'a TemplateRef, plan_id: &str) -> Result<Option<&'a TemplatePlan>> {
    let plans = template.plans();
    if plans.is_empty() {
        return Ok(None);
    }

    let not_found = || BrokerError::PlanNotFound {
        service_id: template.service_id().to_string(),
        plan_id: plan_id.to_string(),
    };

    let (prefix, index) = plan_id.rsplit_once('-').ok_or_else(not_found)?;
    if prefix != template.service_id() {
        return Err(not_found());
    }
    let index: usize = index.parse().map_err(|_| not_found())?;
    plans.get(index).map(Some).ok_or_else(not_found)
}

/// Merge plan-fixed and caller-supplied values into the template's parameter
/// list.
///
/// Plan-fixed values win over caller values for the same key, and caller
/// values override declared defaults. Required parameters must end up with a
/// non-blank value from the plan or the caller. Every merged value is then
/// checked against the parameter's regex and value type.
pub fn merge_parameters(
    parameters: &[ParamSpec],
    requested: &BTreeMap<String, serde_json::Value>,
    plan: Option<&TemplatePlan>,
) -> Result<Vec<ParamSpec>> {
    for key in requested.keys() {
        if !parameters.iter().any(|param| &param.name == key) {
            debug!("ignoring undeclared parameter {}", key);
        }
    }

    let mut merged = Vec::with_capacity(parameters.len());
    for param in parameters {
        let mut resolved = param.clone();
        let fixed = plan.and_then(|plan| plan.fixed_parameters().get(&param.name));
        let supplied = requested.get(&param.name).and_then(ParamValue::from_json);

        let has_value = if let Some(value) = fixed {
            if supplied.as_ref().is_some_and(|s| s != value) {
                debug!("parameter {} is fixed by the plan, ignoring caller value", param.name);
            }
            resolved.value = Some(value.clone());
            !value.is_blank()
        } else if let Some(value) = supplied {
            let blank = value.is_blank();
            resolved.value = Some(value);
            !blank
        } else {
            false
        };

        if param.required && !has_value {
            return Err(BrokerError::MissingRequiredParameter(param.name.clone()));
        }
        if let Some(value) = &resolved.value {
            validate_value(param, value)?;
        }
        merged.push(resolved);
    }

    Ok(merged)
}

/// Check a merged value against the declared regex and value type.
fn validate_value(param: &ParamSpec, value: &ParamValue) -> Result<()> {
    if value.is_blank() {
        return Ok(());
    }
    let text = value.to_string();

    if let Some(pattern) = param.regex.as_deref().filter(|p| !p.is_empty()) {
        match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) if !re.is_match(&text) => {
                return Err(BrokerError::InvalidParameter {
                    name: param.name.clone(),
                    reason: format!("value does not match {}", pattern),
                });
            }
            Ok(_) => {}
            Err(e) => warn!("parameter {} declares an invalid regex: {}", param.name, e),
        }
    }

    if param.value_type.as_deref() == Some("number") && text.parse::<f64>().is_err() {
        return Err(BrokerError::InvalidParameter {
            name: param.name.clone(),
            reason: format!("{} is not a number", text),
        });
    }

    Ok(())
}
