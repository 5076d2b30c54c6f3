//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `#[serde(default)]` helpers and `Default` implementations
//! 2. **Config file**: TOML file specified by the `GATEWAY_CONFIG` env var
//! 3. **Environment variables**: `GATEWAY__SECTION__FIELD` overrides a single field
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP front-end (bind address, concurrency, request deadline)
//! - [`TransportConfig`]: retry, jail, and rate-window constants of the target pool
//! - [`FailoverTarget`]: statically configured backup nodes with hourly quotas
//! - [`RefresherConfig`]: how often the target pool is rebuilt from storage
//! - [`StatsConfig`]: request telemetry buffering
//! - [`StorageConfig`]: `SQLite` location shared by the proxy and the scanner
//! - [`ScannerConfig`]: worker pool, probe constants, and whois enrichment
//! - [`MetricsConfig`], [`LoggingConfig`]: observability
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_port = 8899
//!
//! [transport]
//! max_attempts = 5
//! jail_unit_ms = 1000
//!
//! [[failover]]
//! url = "https://api.mainnet-beta.solana.com"
//! hourly_quota = 36000
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `8899`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of concurrent RPC requests the server can handle. Defaults to `1000`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Deadline for a whole proxied request, retries included. Defaults to `60`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Largest accepted request body. Defaults to 1 MiB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8899
}

fn default_max_concurrent_requests() -> usize {
    1000
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Retry, jail, and rate-limit constants for the target pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Upper bound on attempts per request across both pools. Defaults to `5`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Jail time added per consecutive error, in milliseconds. Defaults to `1000`.
    #[serde(default = "default_jail_unit_ms")]
    pub jail_unit_ms: u64,

    /// Consecutive successes that fully rehabilitate a target. Defaults to `10`.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Length of the fixed rate-limit window. Defaults to `10`.
    #[serde(default = "default_rate_window_seconds")]
    pub rate_window_seconds: u64,

    /// How many scanned methods a target may lack and still serve unscanned
    /// methods. Defaults to `1`.
    #[serde(default = "default_unscanned_method_slack")]
    pub unscanned_method_slack: usize,

    /// Timeout for a single backend round trip. Defaults to `30`.
    #[serde(default = "default_attempt_timeout_seconds")]
    pub attempt_timeout_seconds: u64,

    /// Whether failures jail primary targets. Defaults to `true`.
    #[serde(default = "default_true")]
    pub primary_jailing: bool,

    /// Whether failures jail failover targets. Defaults to `false`.
    #[serde(default)]
    pub failover_jailing: bool,

    /// Concurrent outbound requests allowed by the HTTP client. Defaults to `2000`.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_jail_unit_ms() -> u64 {
    1000
}

fn default_success_threshold() -> u32 {
    10
}

fn default_rate_window_seconds() -> u64 {
    10
}

fn default_unscanned_method_slack() -> usize {
    1
}

fn default_attempt_timeout_seconds() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_concurrent_limit() -> usize {
    2000
}

/// A statically configured backup node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverTarget {
    /// HTTP(S) URL of the node.
    pub url: String,

    /// Requests allowed per hour, `0` for unlimited.
    #[serde(default)]
    pub hourly_quota: u64,
}

impl FailoverTarget {
    /// Converts the hourly quota into a quota for one rate window, rounding up so
    /// that a non-zero hourly quota never becomes unlimited.
    #[must_use]
    pub fn window_quota(&self, window: Duration) -> u64 {
        if self.hourly_quota == 0 {
            return 0;
        }
        let window_secs = window.as_secs().max(1);
        (self.hourly_quota * window_secs).div_ceil(3600)
    }
}

/// Endpoint refresher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefresherConfig {
    /// Seconds between target pool rebuilds. Defaults to `30`.
    #[serde(default = "default_refresh_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_refresh_interval_seconds() -> u64 {
    30
}

/// Request telemetry buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between buffer flushes. Defaults to `10`.
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,

    /// Entries kept before the oldest are dropped. Defaults to `10000`.
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,
}

fn default_flush_interval_seconds() -> u64 {
    10
}

fn default_max_buffered() -> usize {
    10_000
}

/// Peer storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://db/gateway.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    8
}

/// IP enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoisConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an ip-api compatible service.
    #[serde(default = "default_whois_base_url")]
    pub base_url: String,
}

fn default_whois_base_url() -> String {
    "http://ip-api.com".to_string()
}

/// Scanner worker pool and probe constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Blockchain name used to partition storage. Defaults to `solana`.
    #[serde(default = "default_blockchain")]
    pub blockchain: String,

    /// Number of parallel scanner workers. Defaults to `8`.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the shared task queue. Defaults to `4096`.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds between full scan cycles. Defaults to `600`.
    #[serde(default = "default_scan_interval_seconds")]
    pub scan_interval_seconds: u64,

    /// Seconds between gossip discovery passes. Defaults to `3600`.
    #[serde(default = "default_discovery_interval_seconds")]
    pub discovery_interval_seconds: u64,

    /// Timeout for one probe call. Defaults to `10`.
    #[serde(default = "default_probe_timeout_seconds")]
    pub probe_timeout_seconds: u64,

    /// Genesis hash of the network peers must belong to.
    #[serde(default = "default_genesis_hash")]
    pub genesis_hash: String,

    /// Trusted node used for the validator set at startup.
    #[serde(default = "default_bootstrap_rpc_url")]
    pub bootstrap_rpc_url: String,

    /// RPC port assumed for gossip-only peers. Defaults to `8899`.
    #[serde(default = "default_rpc_port")]
    pub default_rpc_port: u16,

    /// Account whose owner is checked by account probes.
    #[serde(default = "default_known_account")]
    pub known_account: String,

    /// Expected owner of [`Self::known_account`].
    #[serde(default = "default_known_account_owner")]
    pub known_account_owner: String,

    /// Address with a steady stream of signatures, used by history probes.
    #[serde(default = "default_known_signature_address")]
    pub known_signature_address: String,

    #[serde(default)]
    pub whois: WhoisConfig,
}

fn default_blockchain() -> String {
    "solana".to_string()
}

fn default_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_scan_interval_seconds() -> u64 {
    600
}

fn default_discovery_interval_seconds() -> u64 {
    3600
}

fn default_probe_timeout_seconds() -> u64 {
    10
}

fn default_genesis_hash() -> String {
    "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdpKuc147dw2N9d".to_string()
}

fn default_bootstrap_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_rpc_port() -> u16 {
    8899
}

fn default_known_account() -> String {
    "SysvarC1ock11111111111111111111111111111111".to_string()
}

fn default_known_account_owner() -> String {
    "Sysvar1111111111111111111111111111111111111".to_string()
}

fn default_known_signature_address() -> String {
    "Vote111111111111111111111111111111111111111".to_string()
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level applied to the workspace crates. Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `pretty`. Defaults to `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Backup nodes used only when no primary target qualifies.
    #[serde(default)]
    pub failover: Vec<FailoverTarget>,

    #[serde(default)]
    pub refresher: RefresherConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            jail_unit_ms: default_jail_unit_ms(),
            success_threshold: default_success_threshold(),
            rate_window_seconds: default_rate_window_seconds(),
            unscanned_method_slack: default_unscanned_method_slack(),
            attempt_timeout_seconds: default_attempt_timeout_seconds(),
            primary_jailing: true,
            failover_jailing: false,
            concurrent_limit: default_concurrent_limit(),
        }
    }
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self { interval_seconds: default_refresh_interval_seconds() }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval_seconds: default_flush_interval_seconds(),
            max_buffered: default_max_buffered(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_url: default_database_url(), max_connections: default_max_connections() }
    }
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self { enabled: false, base_url: default_whois_base_url() }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            blockchain: default_blockchain(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            scan_interval_seconds: default_scan_interval_seconds(),
            discovery_interval_seconds: default_discovery_interval_seconds(),
            probe_timeout_seconds: default_probe_timeout_seconds(),
            genesis_hash: default_genesis_hash(),
            bootstrap_rpc_url: default_bootstrap_rpc_url(),
            default_rpc_port: default_rpc_port(),
            known_account: default_known_account(),
            known_account_owner: default_known_account_owner(),
            known_signature_address: default_known_signature_address(),
            whois: WhoisConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `GATEWAY__` prefix can override any configuration value.
    /// Use `__` as a separator for nested fields (e.g., `GATEWAY__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `GATEWAY_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.transport.max_attempts == 0 {
            return Err("Transport max_attempts must be at least 1".to_string());
        }

        if self.transport.rate_window_seconds == 0 {
            return Err("Transport rate_window_seconds must be at least 1".to_string());
        }

        for target in &self.failover {
            match url::Url::parse(&target.url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => return Err(format!("Invalid failover URL: {}", target.url)),
            }
        }

        if self.scanner.workers == 0 {
            return Err("Scanner workers must be greater than 0".to_string());
        }

        if self.scanner.queue_capacity == 0 {
            return Err("Scanner queue capacity must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    /// Returns the server socket address.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not a valid IP address.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        let ip: std::net::IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|e| format!("Invalid bind address '{}': {e}", self.server.bind_address))?;
        Ok(std::net::SocketAddr::new(ip, self.server.bind_port))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresher.interval_seconds.max(1))
    }

    #[must_use]
    pub fn stats_flush_interval(&self) -> Duration {
        Duration::from_secs(self.stats.flush_interval_seconds.max(1))
    }
}

impl TransportConfig {
    #[must_use]
    pub fn jail_unit(&self) -> Duration {
        Duration::from_millis(self.jail_unit_ms)
    }

    #[must_use]
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_seconds.max(1))
    }

    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }
}

impl ScannerConfig {
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds.max(1))
    }

    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_seconds.max(1))
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.bind_port, 8899);
        assert_eq!(config.transport.max_attempts, 5);
        assert_eq!(config.transport.success_threshold, 10);
        assert_eq!(config.transport.rate_window_seconds, 10);
        assert_eq!(config.transport.unscanned_method_slack, 1);
        assert!(config.transport.primary_jailing);
        assert!(!config.transport.failover_jailing);
        assert!(config.failover.is_empty());
        assert!(config.stats.enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.transport.max_attempts = 0;
        assert!(config.validate().is_err());
        config.transport.max_attempts = 5;

        config.failover =
            vec![FailoverTarget { url: "invalid-url".to_string(), hourly_quota: 100 }];
        assert!(config.validate().is_err());

        config.failover = vec![FailoverTarget {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            hourly_quota: 100,
        }];
        assert!(config.validate().is_ok());

        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_quota_conversion() {
        let window = Duration::from_secs(10);

        let unlimited = FailoverTarget { url: "http://a".to_string(), hourly_quota: 0 };
        assert_eq!(unlimited.window_quota(window), 0);

        let even = FailoverTarget { url: "http://a".to_string(), hourly_quota: 3600 };
        assert_eq!(even.window_quota(window), 10);

        // rounds up so a tiny quota stays limited instead of unlimited
        let tiny = FailoverTarget { url: "http://a".to_string(), hourly_quota: 1 };
        assert_eq!(tiny.window_quota(window), 1);
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 8899);

        let mut bad = AppConfig::default();
        bad.server.bind_address = "not-an-ip".to_string();
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[server]
bind_port = 8080

[transport]
jail_unit_ms = 250
unscanned_method_slack = 2

[[failover]]
url = "https://backup.example.com"
hourly_quota = 7200

[scanner]
workers = 16
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.bind_port, 8080);
        assert_eq!(config.transport.jail_unit(), Duration::from_millis(250));
        assert_eq!(config.transport.unscanned_method_slack, 2);
        assert_eq!(config.transport.max_attempts, 5);
        assert_eq!(config.failover[0].hourly_quota, 7200);
        assert_eq!(config.scanner.workers, 16);
        assert_eq!(config.scanner.blockchain, "solana");
    }
}
