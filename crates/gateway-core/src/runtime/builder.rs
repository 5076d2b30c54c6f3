//! Builder for the gateway runtime.

use crate::{
    config::AppConfig,
    metrics::MetricsCollector,
    proxy::ProxyEngine,
    stats::StatsCollector,
    storage::{PeerRepository, SqliteRepository, StorageError},
    types::SCANNED_METHODS,
    upstream::{Transport, TransportError},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{lifecycle::GatewayRuntime, GatewayComponents};

const SHUTDOWN_CHANNEL_CAPACITY: usize = 16;

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to initialize metrics collector: {0}")]
    MetricsInitialization(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Primary storage unreachable or schema setup failed.
    #[error("Storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    /// Invalid failover target or HTTP client setup failure.
    #[error("Transport initialization failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_refresher: bool,
    enable_stats: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { enable_refresher: true, enable_stats: true }
    }
}

/// Builds a [`GatewayRuntime`].
///
/// # Examples
///
/// ```no_run
/// # use gateway_core::{config::AppConfig, runtime::GatewayRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
///
/// let runtime = GatewayRuntimeBuilder::new().with_config(config).build().await?;
/// # Ok(())
/// # }
/// ```
pub struct GatewayRuntimeBuilder {
    config: Option<AppConfig>,
    repository: Option<Arc<dyn PeerRepository>>,
    options: RuntimeOptions,
}

impl GatewayRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, repository: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses an existing repository instead of connecting to `storage.database_url`.
    ///
    /// The caller is responsible for its schema.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn PeerRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Skips the endpoint refresher; targets must then be managed by hand.
    #[must_use]
    pub fn disable_refresher(mut self) -> Self {
        self.options.enable_refresher = false;
        self
    }

    /// Skips request telemetry regardless of `stats.enabled`.
    #[must_use]
    pub fn disable_stats(mut self) -> Self {
        self.options.enable_stats = false;
        self
    }

    /// Initializes every component and starts the background tasks.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError` if the configuration is missing or invalid, storage
    /// cannot be opened, or a failover target is invalid.
    pub async fn build(self) -> Result<GatewayRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;
        config.validate().map_err(RuntimeError::ConfigValidation)?;

        let enable_stats = self.options.enable_stats && config.stats.enabled;
        info!(
            failover_targets = config.failover.len(),
            refresher_enabled = self.options.enable_refresher,
            stats_enabled = enable_stats,
            "Initializing gateway runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(SHUTDOWN_CHANNEL_CAPACITY);

        let metrics_collector = Arc::new(
            MetricsCollector::new()
                .map_err(|e| RuntimeError::MetricsInitialization(e.to_string()))?,
        );
        debug!("Metrics collector initialized");

        let repository: Arc<dyn PeerRepository> = match self.repository {
            Some(repository) => repository,
            None => {
                let repository = SqliteRepository::new(
                    &config.storage.database_url,
                    config.storage.max_connections,
                )
                .await?;
                repository.init_schema().await?;
                repository.seed_methods(&config.scanner.blockchain, SCANNED_METHODS).await?;
                Arc::new(repository)
            }
        };
        debug!("Peer storage initialized");

        let transport = Arc::new(Transport::from_config(&config, metrics_collector.clone())?);

        let stats_collector = enable_stats.then(|| {
            Arc::new(StatsCollector::new(
                repository.clone(),
                metrics_collector.clone(),
                &config.stats,
            ))
        });

        let proxy_engine = Arc::new(ProxyEngine::new(
            transport.clone(),
            metrics_collector.clone(),
            stats_collector.clone(),
        ));
        debug!("Proxy engine initialized");

        let components = GatewayComponents::new(
            metrics_collector,
            repository,
            transport,
            stats_collector,
            proxy_engine,
        );
        let runtime =
            GatewayRuntime::new(components, shutdown_tx, &config, self.options.enable_refresher);

        info!("Gateway runtime initialization complete");
        Ok(runtime)
    }
}

impl Default for GatewayRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailoverTarget;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.database_url = ":memory:".to_string();
        config.storage.max_connections = 1;
        config
    }

    #[tokio::test]
    async fn test_builder_requires_config() {
        let result = GatewayRuntimeBuilder::new().build().await;
        assert!(matches!(result, Err(RuntimeError::ConfigValidation(_))));
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_failover() {
        let mut config = memory_config();
        config.failover.push(FailoverTarget { url: "ftp://backup".to_string(), hourly_quota: 0 });

        let result = GatewayRuntimeBuilder::new().with_config(config).build().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_seeds_method_catalog() {
        let mut runtime = GatewayRuntimeBuilder::new()
            .with_config(memory_config())
            .build()
            .await
            .expect("runtime should build");

        let methods = runtime.components().repository().list_methods("solana").await.unwrap();
        assert_eq!(methods.len(), SCANNED_METHODS.len());
        assert!(runtime.components().has_stats_collector());

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_builder_disable_stats() {
        let mut runtime = GatewayRuntimeBuilder::new()
            .with_config(memory_config())
            .disable_stats()
            .disable_refresher()
            .build()
            .await
            .expect("runtime should build");

        assert!(!runtime.components().has_stats_collector());
        runtime.shutdown().await;
    }
}
