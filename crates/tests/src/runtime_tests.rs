//! Integration tests for the runtime lifecycle.
//!
//! The runtime is built on an in-memory database, peers are written behind its back,
//! and the background refresher is expected to pick them up. Shutdown must be
//! idempotent and must flush buffered request stats.

use crate::mock_infrastructure::{memory_repository, new_peer, RpcMockBuilder};
use gateway_core::{
    config::{AppConfig, FailoverTarget},
    proxy::RequestContext,
    runtime::{GatewayRuntime, RuntimeError},
    storage::{PeerRepository, PeerStatus},
};
use serde_json::json;
use serial_test::serial;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.refresher.interval_seconds = 1;
    config.stats.flush_interval_seconds = 3600;
    config
}

#[tokio::test]
#[serial]
async fn test_refresher_loads_scanned_peers() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_result("getSlot", json!(42));

    let repository = memory_repository().await;
    let id = repository.insert_peer(&new_peer(&node.host_with_port())).await.unwrap();
    repository
        .update_peer_status(
            id,
            &PeerStatus {
                is_alive: true,
                is_mainnet: Some(true),
                is_rpc: true,
                is_validator: false,
                version: Some("1.18.22".to_string()),
            },
        )
        .await
        .unwrap();
    repository.upsert_peer_method(id, "getSlot", 12).await.unwrap();

    let mut runtime = GatewayRuntime::builder()
        .with_config(fast_config())
        .with_repository(repository.clone())
        .build()
        .await
        .unwrap();

    let transport = runtime.transport().clone();
    timeout(Duration::from_secs(5), async {
        while transport.primary().is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("refresher should add the scanned peer");

    let mut ctx = RequestContext::new("runtime-test");
    let reply = runtime
        .proxy_engine()
        .handle(&mut ctx, Some("application/json"), br#"{"jsonrpc":"2.0","id":1,"method":"getSlot"}"#)
        .await;
    assert_eq!(reply.status, 200);
    assert_eq!(ctx.target.as_deref(), Some(node.url().as_str()));

    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown completes");
    assert_eq!(repository.count_request_stats().await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn test_shutdown_is_idempotent() {
    let mut runtime = GatewayRuntime::builder()
        .with_config(fast_config())
        .with_repository(memory_repository().await)
        .build()
        .await
        .unwrap();

    let mut receivers: Vec<_> = (0..3).map(|_| runtime.shutdown_receiver()).collect();

    timeout(Duration::from_secs(5), runtime.shutdown()).await.unwrap();
    timeout(Duration::from_secs(1), runtime.shutdown()).await.unwrap();

    for rx in &mut receivers {
        assert!(rx.try_recv().is_ok());
    }
}

#[tokio::test]
#[serial]
async fn test_invalid_failover_aborts_startup() {
    let mut config = fast_config();
    config.failover.push(FailoverTarget { url: "not a url".to_string(), hourly_quota: 0 });

    let result = GatewayRuntime::builder()
        .with_config(config)
        .with_repository(memory_repository().await)
        .build()
        .await;

    assert!(matches!(result, Err(RuntimeError::ConfigValidation(_))));
}

#[tokio::test]
#[serial]
async fn test_unreachable_database_aborts_startup() {
    let mut config = fast_config();
    config.storage.database_url = "sqlite:///nonexistent-dir/gateway.db".to_string();

    let result = GatewayRuntime::builder().with_config(config).build().await;
    assert!(matches!(result, Err(RuntimeError::Storage(_))));
}

#[tokio::test]
#[serial]
async fn test_components_are_shared() {
    let mut runtime = GatewayRuntime::builder()
        .with_config(fast_config())
        .with_repository(memory_repository().await)
        .disable_refresher()
        .build()
        .await
        .unwrap();

    assert!(Arc::ptr_eq(runtime.transport(), runtime.proxy_engine().transport()));
    assert!(runtime.components().has_stats_collector());
    runtime.shutdown().await;
}
