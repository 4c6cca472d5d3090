//! Credential and endpoint extraction for service bindings.

use k8s_openapi::api::core::v1::{Secret, Service};
use log::debug;

use crate::error::{BrokerError, Result, StoreError};
use crate::model::{BindingResponse, Endpoint, TemplateInstance};
use crate::store::traits::Store;

/// Reserved credentials key holding the collected endpoints
pub const ENDPOINTS_KEY: &str = "endpoints";

const LOAD_BALANCER: &str = "LoadBalancer";

/// Kind and name of one manifest object
fn object_ref(index: usize, object: &serde_json::Value) -> Result<(&str, &str)> {
    let malformed = |message: &str| BrokerError::InvalidManifestObject {
        index,
        message: message.to_string(),
    };
    let kind = object
        .get("kind")
        .and_then(|kind| kind.as_str())
        .ok_or_else(|| malformed("missing string field kind"))?;
    let name = object
        .get("metadata")
        .and_then(|metadata| metadata.get("name"))
        .and_then(|name| name.as_str())
        .ok_or_else(|| malformed("missing string field metadata.name"))?;
    Ok((kind, name))
}

/// One endpoint per load balancer ingress point, carrying every declared port.
pub fn service_endpoints(service: &Service) -> Vec<Endpoint> {
    let is_load_balancer = service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        == Some(LOAD_BALANCER);
    if !is_load_balancer {
        return Vec::new();
    }

    let ports: Vec<String> = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| ports.iter().map(|port| port.port.to_string()).collect())
        .unwrap_or_default();

    service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| {
            ingress
                .iter()
                .filter_map(|point| point.ip.clone().or_else(|| point.hostname.clone()))
                .map(|host| Endpoint {
                    host,
                    ports: ports.clone(),
                    protocol: None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn copy_secret(secret: &Secret, response: &mut BindingResponse) {
    for (key, value) in secret.data.iter().flatten() {
        let decoded = String::from_utf8_lossy(&value.0).into_owned();
        response.credentials.insert(key.clone(), decoded.into());
    }
}

/// Resolve credentials and endpoints from the live resources an instance
/// created. Objects are processed in manifest order; later secrets overwrite
/// earlier keys.
pub async fn resolve_binding<S: Store + ?Sized>(
    store: &S,
    instance: &TemplateInstance,
    namespace: &str,
) -> Result<BindingResponse> {
    let mut response = BindingResponse::default();

    for (index, object) in instance.objects().iter().enumerate() {
        let (kind, name) = object_ref(index, object)?;
        let not_found = || BrokerError::BoundResourceNotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };

        match kind {
            "Service" => {
                let service = store.get_service(namespace, name).await?.ok_or_else(not_found)?;
                response.endpoints.extend(service_endpoints(&service));
            }
            "Secret" => {
                let secret = store.get_secret(namespace, name).await?.ok_or_else(not_found)?;
                copy_secret(&secret, &mut response);
            }
            _ => debug!("skipping {} {} for binding", kind, name),
        }
    }

    if !response.endpoints.is_empty() {
        let endpoints = serde_json::to_value(&response.endpoints)
            .map_err(|e| StoreError::serialization("Endpoint", e))?;
        response.credentials.insert(ENDPOINTS_KEY.to_string(), endpoints);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceIdentity, Template, TemplateRef, TemplateSpec};
    use crate::store::MemoryStore;
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, ServicePort, ServiceSpec, ServiceStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        }
    }

    fn secret(name: &str, pairs: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: meta(name),
            data: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    fn service(name: &str, type_: &str, ports: &[i32], ips: &[&str]) -> Service {
        Service {
            metadata: meta(name),
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                ports: Some(
                    ports
                        .iter()
                        .map(|port| ServicePort {
                            port: *port,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(
                        ips.iter()
                            .map(|ip| LoadBalancerIngress {
                                ip: Some(ip.to_string()),
                                ..Default::default()
                            })
                            .collect(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    fn instance(objects: Vec<serde_json::Value>) -> TemplateInstance {
        let identity = InstanceIdentity {
            name: "a.b.c".to_string(),
            namespace: "default".to_string(),
            logical_name: "c".to_string(),
            instance_id: "c".to_string(),
            service_id: "a".to_string(),
            plan_id: "b".to_string(),
        };
        let spec = TemplateSpec {
            objects,
            ..Default::default()
        };
        TemplateInstance::new(&identity, &TemplateRef::from(Template::new("t", "default", "a", spec)), Vec::new())
    }

    #[tokio::test]
    async fn test_secret_credentials() {
        let store = MemoryStore::new();
        store.insert_secret(secret("creds", &[("password", "abc123")]));
        let inst = instance(vec![json!({"kind": "Secret", "metadata": {"name": "creds"}})]);

        let response = resolve_binding(&store, &inst, "default").await.unwrap();
        assert_eq!(serde_json::Value::Object(response.credentials), json!({"password": "abc123"}));
        assert!(response.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_load_balancer_endpoints() {
        let store = MemoryStore::new();
        store.insert_service(service("web", "LoadBalancer", &[8080], &["10.0.0.5"]));
        let inst = instance(vec![json!({"kind": "Service", "metadata": {"name": "web"}})]);

        let response = resolve_binding(&store, &inst, "default").await.unwrap();
        let expected = Endpoint {
            host: "10.0.0.5".to_string(),
            ports: vec!["8080".to_string()],
            protocol: None,
        };
        assert_eq!(response.endpoints, vec![expected]);
        assert_eq!(
            response.credentials[ENDPOINTS_KEY],
            json!([{"host": "10.0.0.5", "ports": ["8080"]}])
        );
    }

    #[tokio::test]
    async fn test_cluster_ip_service_has_no_endpoints() {
        let store = MemoryStore::new();
        store.insert_service(service("web", "ClusterIP", &[80], &[]));
        let inst = instance(vec![json!({"kind": "Service", "metadata": {"name": "web"}})]);

        let response = resolve_binding(&store, &inst, "default").await.unwrap();
        assert!(response.credentials.is_empty());
        assert!(response.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_later_secret_overwrites_earlier() {
        let store = MemoryStore::new();
        store.insert_secret(secret("first", &[("user", "admin"), ("password", "one")]));
        store.insert_secret(secret("second", &[("password", "two")]));
        let inst = instance(vec![
            json!({"kind": "Secret", "metadata": {"name": "first"}}),
            json!({"kind": "Deployment", "metadata": {"name": "app"}}),
            json!({"kind": "Secret", "metadata": {"name": "second"}}),
        ]);

        let response = resolve_binding(&store, &inst, "default").await.unwrap();
        assert_eq!(response.credentials["password"], "two");
        assert_eq!(response.credentials["user"], "admin");
    }

    #[tokio::test]
    async fn test_malformed_object_aborts_binding() {
        let store = MemoryStore::new();
        store.insert_secret(secret("creds", &[("password", "abc123")]));
        let inst = instance(vec![
            json!({"kind": "Secret", "metadata": {"name": "creds"}}),
            json!({"kind": "Secret"}),
        ]);

        let err = resolve_binding(&store, &inst, "default").await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidManifestObject { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_live_resource() {
        let store = MemoryStore::new();
        let inst = instance(vec![json!({"kind": "Secret", "metadata": {"name": "creds"}})]);
        let err = resolve_binding(&store, &inst, "default").await.unwrap_err();
        assert!(matches!(err, BrokerError::BoundResourceNotFound { .. }));
    }

    #[test]
    fn test_hostname_ingress() {
        let mut svc = service("web", "LoadBalancer", &[80, 443], &[]);
        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    hostname: Some("lb.example.com".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        let endpoints = service_endpoints(&svc);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].host, "lb.example.com");
        assert_eq!(endpoints[0].ports, vec!["80", "443"]);
    }
}
