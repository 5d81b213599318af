//! Application state wiring the registry to its concrete connector.
//!
//! The registry is generic over the agent connector trait, but AppState pins
//! it to the CLI subprocess implementation from parley-infra. Handlers get
//! the state injected by axum -- there is no ambient global session map.

use std::sync::Arc;

use parley_core::registry::SessionRegistry;
use parley_infra::agent::CliConnector;
use parley_infra::config::{load_config, resolve_data_dir};
use parley_types::config::GatewayConfig;

/// Concrete registry type pinned to the CLI connector.
pub type ConcreteRegistry = SessionRegistry<CliConnector>;

/// Shared application state injected into request handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConcreteRegistry>,
    pub config: GatewayConfig,
}

impl AppState {
    /// Initialize the application state: resolve the data dir, load config,
    /// build the (empty) session registry.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_config(&data_dir).await;
        Ok(Self::with_config(config))
    }

    /// Build state from an already-loaded configuration.
    pub fn with_config(config: GatewayConfig) -> Self {
        let connector = CliConnector::new(config.agent.clone());
        Self {
            registry: Arc::new(SessionRegistry::new(connector)),
            config,
        }
    }
}
