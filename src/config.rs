use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BrokerError, Result};

/// Mounted service-account namespace when running inside a cluster
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which template kind the broker serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrokerScope {
    /// Templates from the operating namespace; instances created there
    #[default]
    Namespaced,
    /// ClusterTemplates; instances created in the request's namespace
    Cluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    /// `{service_id}.{plan_id}.{instance_id}`
    #[default]
    Deterministic,
    /// The caller's `context.instance_name`
    InstanceName,
}

/// What provisioning does when the instance name is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    Conflict,
    ReturnExisting,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub scope: BrokerScope,
    pub naming: NamingStrategy,
    pub on_conflict: ConflictPolicy,
    /// Operating namespace override
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    #[default]
    Kubernetes,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON or YAML objects loaded into the memory backend at startup
    pub seed_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and
    /// `TSB_`-prefixed environment variables (`TSB_BROKER__SCOPE=cluster`).
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        config = config.add_source(
            config::Environment::with_prefix("TSB")
                .prefix_separator("_")
                .separator("__"),
        );

        let app_config: AppConfig = config.build()?.try_deserialize()?;
        Ok(app_config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// The namespace this broker operates in.
    pub fn namespace(&self) -> Result<String> {
        if let Some(namespace) = self.broker.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            return Ok(namespace.to_string());
        }
        discover_namespace(
            Path::new(SERVICE_ACCOUNT_NAMESPACE_PATH),
            std::env::var("NAMESPACE").ok(),
        )
    }
}

/// Mounted namespace file when present, else the env value, else `default`.
pub fn discover_namespace(path: &Path, env: Option<String>) -> Result<String> {
    if path.exists() {
        let namespace = std::fs::read_to_string(path)
            .map_err(|e| BrokerError::NamespaceUndiscoverable(format!("{}: {}", path.display(), e)))?;
        return Ok(namespace.trim().to_string());
    }
    Ok(env
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
}
