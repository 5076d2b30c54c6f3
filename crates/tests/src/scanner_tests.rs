//! Integration tests for the scanner feeding the proxy.
//!
//! A mockito node plays a healthy mainnet peer. Discovery finds it through
//! `getClusterNodes`, a scan records its methods, and the endpoint refresher turns the
//! stored capabilities into a primary target the proxy routes to.

use crate::mock_infrastructure::{
    engine, memory_repository, metrics, new_peer, RpcMockBuilder, TEST_SLOT,
};
use gateway_core::{
    config::{AppConfig, ScannerConfig},
    proxy::{EndpointRefresher, RequestContext},
    scanner::{
        ChainAdapter, NoopResolver, ProbeSettings, Prober, RpcClient, ScanState, ScanTask,
        Scanner, SolanaAdapter,
    },
    storage::{PeerRepository, SqliteRepository},
    types::SCANNED_METHODS,
    upstream::{HttpClient, Transport},
};
use serde_json::{json, Value};
use serial_test::serial;
use std::{sync::Arc, time::Duration};

fn prober() -> Prober {
    let client = RpcClient::new(Arc::new(HttpClient::new().unwrap()), Duration::from_secs(5));
    Prober::new(client, ProbeSettings::from(&ScannerConfig::default()), metrics())
}

fn adapter(repository: Arc<SqliteRepository>, bootstrap: &str) -> SolanaAdapter {
    let config = ScannerConfig { bootstrap_rpc_url: bootstrap.to_string(), ..ScannerConfig::default() };
    SolanaAdapter::new(repository, prober(), Arc::new(NoopResolver), metrics(), &config)
}

#[tokio::test]
#[serial]
async fn test_healthy_node_passes_every_probe() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_healthy_node();

    let report = prober().probe_url(&node.url()).await;

    assert_eq!(report.state, ScanState::Probed);
    assert_eq!(report.version.as_deref(), Some("1.18.22"));
    assert_eq!(report.methods.len(), SCANNED_METHODS.len());
    let invalid: Vec<_> = report.methods.iter().filter(|p| !p.valid).map(|p| p.method).collect();
    assert!(invalid.is_empty(), "unexpected invalid probes: {invalid:?}");
}

#[tokio::test]
#[serial]
async fn test_send_transaction_sanitize_failure_counts_as_valid() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_result("getVersion", json!({"solana-core": "2.0.3"}))
        .mock_result("getGenesisHash", json!(crate::mock_infrastructure::MAINNET_GENESIS))
        .mock_error("sendTransaction", -32602, "invalid transaction: Transaction failed to sanitize accounts offsets correctly")
        .mock_error("simulateTransaction", -32002, "Transaction simulation failed");

    let report = prober().probe_url(&node.url()).await;
    let valid = |method: &str| report.methods.iter().find(|p| p.method == method).unwrap().valid;

    assert_eq!(report.state, ScanState::Probed);
    assert!(valid("getVersion"));
    assert!(valid("sendTransaction"));
    assert!(!valid("simulateTransaction"));
    // No getSlot mock, so the dependent block probe is skipped.
    assert!(!valid("getSlot"));
    assert!(!valid("getBlock"));
}

#[tokio::test]
#[serial]
async fn test_discover_scan_refresh_and_route() {
    let mut node = RpcMockBuilder::new().await;
    let rpc_addr = node.host_with_port();
    node.mock_healthy_node().mock_result(
        "getClusterNodes",
        json!([{
            "pubkey": "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2",
            "gossip": "127.0.0.1:8001",
            "rpc": rpc_addr,
            "version": "1.18.22"
        }]),
    );

    let repository = memory_repository().await;
    let adapter = adapter(repository.clone(), &node.url());

    Scanner::run_task(&adapter, &ScanTask::Discover).await;
    let peers = repository.list_peers("solana").await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].rpc_url(), node.url());
    assert!(!peers[0].is_routable());

    Scanner::run_task(&adapter, &ScanTask::Scan(peers[0].clone())).await;
    let peer = repository.get_peer(peers[0].id).await.unwrap().unwrap();
    assert!(peer.is_routable());
    assert_eq!(peer.version.as_deref(), Some("1.18.22"));

    let config = AppConfig::default();
    let transport = Arc::new(Transport::from_config(&config, metrics()).unwrap());
    let refresher =
        EndpointRefresher::new(repository.clone(), transport.clone(), "solana", Duration::from_secs(30));
    let summary = refresher.refresh_once().await.unwrap();
    assert_eq!(summary.added, 1);

    let target = transport.primary().find(&node.url()).unwrap();
    assert_eq!(target.methods().len(), SCANNED_METHODS.len());

    let mut ctx = RequestContext::new("scanner-loop").with_timeout(Duration::from_secs(10));
    let reply = engine(transport)
        .handle(&mut ctx, Some("application/json"), br#"{"jsonrpc":"2.0","id":1,"method":"getSlot"}"#)
        .await;

    assert_eq!(reply.status, 200);
    assert_eq!(ctx.target.as_deref(), Some(node.url().as_str()));
    let body: Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body["result"], TEST_SLOT);
}

#[tokio::test]
#[serial]
async fn test_peer_going_dark_leaves_the_pool() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_healthy_node();

    let repository = memory_repository().await;
    let id = repository.insert_peer(&new_peer(&node.host_with_port())).await.unwrap();
    let adapter = adapter(repository.clone(), "http://127.0.0.1:1");

    let peer = repository.get_peer(id).await.unwrap().unwrap();
    adapter.scan_peer(&peer).await.unwrap();

    let transport = Arc::new(Transport::from_config(&AppConfig::default(), metrics()).unwrap());
    let refresher =
        EndpointRefresher::new(repository.clone(), transport.clone(), "solana", Duration::from_secs(30));
    refresher.refresh_once().await.unwrap();
    assert_eq!(transport.primary().len(), 1);

    drop(node);

    let peer = repository.get_peer(id).await.unwrap().unwrap();
    adapter.scan_peer(&peer).await.unwrap();

    let peer = repository.get_peer(id).await.unwrap().unwrap();
    assert!(!peer.is_alive);
    assert!(!peer.is_rpc);

    let summary = refresher.refresh_once().await.unwrap();
    assert_eq!(summary.removed, 1);
    assert!(transport.primary().is_empty());
}
