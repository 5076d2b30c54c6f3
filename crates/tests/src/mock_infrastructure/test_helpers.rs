//! Test Helper Functions and Utilities
//!
//! Shared fixtures: in-memory storage, transports wired to mock nodes, and peers.

use ahash::AHashSet;
use gateway_core::{
    config::{AppConfig, FailoverTarget},
    metrics::MetricsCollector,
    proxy::ProxyEngine,
    storage::{NewPeer, PeerRepository, SqliteRepository},
    types::SCANNED_METHODS,
    upstream::{Endpoint, Transport},
};
use std::sync::Arc;

pub const MAINNET_GENESIS: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdpKuc147dw2N9d";
pub const KNOWN_ACCOUNT_OWNER: &str = "Sysvar1111111111111111111111111111111111111";
pub const TEST_SLOT: u64 = 281_234_567;
pub const TEST_BLOCKHASH: &str = "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N";
pub const TEST_SIGNATURE: &str =
    "5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv";

/// Fresh in-memory repository with the schema and method catalog in place.
///
/// # Panics
///
/// Panics if the in-memory database cannot be created.
pub async fn memory_repository() -> Arc<SqliteRepository> {
    let repository = SqliteRepository::new("sqlite::memory:", 1)
        .await
        .expect("in-memory database");
    repository.init_schema().await.expect("schema");
    repository.seed_methods("solana", SCANNED_METHODS).await.expect("seed methods");
    Arc::new(repository)
}

/// # Panics
///
/// Panics if the Prometheus recorder cannot be set up.
#[must_use]
pub fn metrics() -> Arc<MetricsCollector> {
    Arc::new(MetricsCollector::new().expect("metrics collector"))
}

/// Transport with the given failover URLs (unlimited quota) and no primaries.
///
/// # Panics
///
/// Panics if a failover URL is invalid.
#[must_use]
pub fn transport_with_failover(config: &mut AppConfig, failover: &[String]) -> Arc<Transport> {
    config.failover = failover
        .iter()
        .map(|url| FailoverTarget { url: url.clone(), hourly_quota: 0 })
        .collect();
    Arc::new(Transport::from_config(config, metrics()).expect("transport"))
}

/// # Panics
///
/// Panics if the metrics collector cannot be created.
#[must_use]
pub fn engine(transport: Arc<Transport>) -> Arc<ProxyEngine> {
    Arc::new(ProxyEngine::new(transport, metrics(), None))
}

/// Primary endpoint supporting exactly `methods`.
#[must_use]
pub fn endpoint(url: &str, methods: &[&str]) -> Endpoint {
    Endpoint { url: url.to_string(), methods: methods.iter().map(|m| (*m).to_string()).collect() }
}

/// Every scanned method except `missing`.
#[must_use]
pub fn scanned_except(missing: &[&str]) -> Vec<&'static str> {
    SCANNED_METHODS.iter().copied().filter(|m| !missing.contains(m)).collect()
}

#[must_use]
pub fn method_set(methods: &[&str]) -> AHashSet<String> {
    methods.iter().map(|m| (*m).to_string()).collect()
}

/// A plain-HTTP solana peer at `host:port`.
///
/// # Panics
///
/// Panics if `host_with_port` has no valid port.
#[must_use]
pub fn new_peer(host_with_port: &str) -> NewPeer {
    let (address, port) = host_with_port.rsplit_once(':').expect("host:port");
    NewPeer {
        blockchain: "solana".to_string(),
        address: address.to_string(),
        port: port.parse().expect("port"),
        version: None,
        node_pubkey: None,
        is_ssl: false,
    }
}

/// Minimal JSON-RPC request body.
#[must_use]
pub fn rpc_body(method: &str, id: u64) -> String {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method}).to_string()
}
