use log::{info, LevelFilter};
use std::path::Path;
use std::sync::Arc;
use template_service_broker::config::{AppConfig, StoreBackend};
use template_service_broker::seed;
use template_service_broker::{app, serve, Broker, BrokerSettings, KubeStore, MemoryStore, Store};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Info by default, client-side noise at Warn; RUST_LOG overrides both
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter_module("kube", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("rustls", LevelFilter::Warn);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();

    let config = AppConfig::load()?;
    info!(
        "configuration loaded: server={} backend={:?}",
        config.server_address(),
        config.store.backend
    );

    let settings = BrokerSettings::from_config(&config)?;

    match config.store.backend {
        StoreBackend::Kubernetes => {
            let store = KubeStore::try_default().await?;
            run(store, settings, &config).await
        }
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            if let Some(seed_file) = config.store.seed_file.as_deref() {
                seed::load_seed_file(&store, Path::new(seed_file), &settings.namespace)?;
            }
            run(store, settings, &config).await
        }
    }
}

async fn run<S: Store + 'static>(store: S, settings: BrokerSettings, config: &AppConfig) -> anyhow::Result<()> {
    let broker = Arc::new(Broker::new(Arc::new(store), settings));
    let listener = TcpListener::bind(config.server_address()).await?;
    serve(listener, app(broker)).await
}
