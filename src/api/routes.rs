use axum::{
    routing::{get, put},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Open Service Broker API
        .route("/v2/catalog", get(handlers::get_catalog::<S>))
        .route(
            "/v2/service_instances/:instance_id",
            put(handlers::provision::<S>).delete(handlers::deprovision::<S>),
        )
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id",
            put(handlers::bind::<S>).delete(handlers::unbind),
        )
}
