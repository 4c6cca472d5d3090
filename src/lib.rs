pub mod api;
pub mod broker;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

pub use api::handlers;
pub use api::routes;

pub use broker::{Broker, BrokerSettings};
pub use error::{BrokerError, StoreError};
pub use model::*;
pub use store::{KubeStore, MemoryStore, Store};

use axum::Router;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the broker router for `broker`.
pub fn app<S: Store + 'static>(broker: Arc<Broker<S>>) -> Router {
    routes::create_router::<S>().with_state(broker)
}

/// Serve `app` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    info!("template service broker listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("template service broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
