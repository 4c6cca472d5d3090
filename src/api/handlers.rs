use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use log::info;
use serde::Serialize;
use std::sync::Arc;

use crate::api::extract::BrokerJson;
use crate::broker::Broker;
use crate::error::Result;
use crate::model::{
    BindingRequest, BindingResponse, Catalog, DeprovisionQuery, EmptyResponse, ProvisionRequest,
};
use crate::store::traits::Store;

pub type AppState<S> = Arc<Broker<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /v2/catalog
pub async fn get_catalog<S: Store>(State(broker): State<AppState<S>>) -> Result<Json<Catalog>> {
    let catalog = broker.catalog().await?;
    info!("serving catalog with {} services", catalog.services.len());
    Ok(Json(catalog))
}

/// PUT /v2/service_instances/:instance_id
pub async fn provision<S: Store>(
    State(broker): State<AppState<S>>,
    Path(instance_id): Path<String>,
    BrokerJson(request): BrokerJson<ProvisionRequest>,
) -> Result<Json<EmptyResponse>> {
    info!(
        "provision request for service instance {} (service {}, plan {})",
        instance_id, request.service_id, request.plan_id
    );
    broker.provision(&instance_id, &request).await?;
    Ok(Json(EmptyResponse {}))
}

/// DELETE /v2/service_instances/:instance_id
pub async fn deprovision<S: Store>(
    State(broker): State<AppState<S>>,
    Path(instance_id): Path<String>,
    Query(query): Query<DeprovisionQuery>,
) -> Result<Json<EmptyResponse>> {
    info!("deprovision request for service instance {}", instance_id);
    broker.deprovision(&instance_id, &query).await?;
    Ok(Json(EmptyResponse {}))
}

/// PUT /v2/service_instances/:instance_id/service_bindings/:binding_id
pub async fn bind<S: Store>(
    State(broker): State<AppState<S>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    BrokerJson(request): BrokerJson<BindingRequest>,
) -> Result<Json<BindingResponse>> {
    info!("bind request {} for service instance {}", binding_id, instance_id);
    let response = broker.bind(&instance_id, &binding_id, &request).await?;
    Ok(Json(response))
}

/// DELETE /v2/service_instances/:instance_id/service_bindings/:binding_id
///
/// Bindings hold no server-side state, so there is nothing to revoke.
pub async fn unbind(Path((instance_id, binding_id)): Path<(String, String)>) -> Json<EmptyResponse> {
    info!("unbind request {} for service instance {}", binding_id, instance_id);
    Json(EmptyResponse {})
}
