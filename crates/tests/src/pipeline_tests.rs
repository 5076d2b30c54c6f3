//! End-to-end tests through the HTTP front-end.
//!
//! Requests enter via the axum router (`tower::ServiceExt::oneshot`), pass validation,
//! and are routed by the transport to mockito nodes. Responses are checked for status,
//! body, and node headers.

use crate::mock_infrastructure::{
    endpoint, engine, memory_repository, metrics, rpc_body, scanned_except,
    transport_with_failover, RpcMockBuilder,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use gateway_core::{
    config::AppConfig,
    proxy::{ProxyEngine, HEADER_NODE_ENDPOINT, HEADER_NODE_REQ_ATTEMPTS},
    stats::StatsCollector,
    storage::PeerRepository,
    upstream::Transport,
};
use serde_json::{json, Value};
use serial_test::serial;
use server::router::{create_app, AppState};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;

fn app(engine: Arc<ProxyEngine>, config: &AppConfig) -> Router {
    create_app(AppState::new(engine, config.request_timeout()), config)
}

fn post(content_type: &str, body: impl Into<String>) -> Request<Body> {
    Request::post("/")
        .header("content-type", content_type)
        .body(Body::from(body.into()))
        .unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
#[serial]
async fn test_unscanned_method_routes_to_primary() {
    let mut primary = RpcMockBuilder::new().await;
    primary.mock_result("getBlockTime", json!(1_700_000_000));

    let mut failover = mockito::Server::new_async().await;
    let untouched = failover.mock("POST", "/").expect(0).create_async().await;

    let mut config = AppConfig::default();
    let transport = transport_with_failover(&mut config, &[failover.url()]);
    transport.update_targets(&[
        endpoint("http://10.255.0.1:8899", &["getSlot"]),
        endpoint(&primary.url(), &scanned_except(&["getTransaction"])),
    ]);

    let response = app(engine(transport), &config)
        .oneshot(post("application/json", rpc_body("getBlockTime", 1)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, HEADER_NODE_ENDPOINT), primary.url());
    assert_eq!(header(&response, HEADER_NODE_REQ_ATTEMPTS), "1");
    assert_eq!(json_body(response).await["result"], 1_700_000_000);
    untouched.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_jailed_primaries_fall_back_to_failover() {
    let mut failover = RpcMockBuilder::new().await;
    failover.mock_result("getSlot", json!(281_234_567));

    let mut config = AppConfig::default();
    let transport = transport_with_failover(&mut config, &[failover.url()]);
    transport.update_targets(&[
        endpoint("http://10.255.0.1:8899", &["getSlot"]),
        endpoint("http://10.255.0.2:8899", &["getSlot"]),
    ]);
    for target in transport.primary().targets().iter() {
        target.update_stats(false);
    }

    let response = app(engine(transport), &config)
        .oneshot(post("application/json", rpc_body("getSlot", 9)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, HEADER_NODE_ENDPOINT), failover.url());
    assert_eq!(header(&response, HEADER_NODE_REQ_ATTEMPTS), "1");
    assert_eq!(json_body(response).await["result"], 281_234_567);
}

#[tokio::test]
#[serial]
async fn test_node_error_retries_on_next_target() {
    let mut broken = RpcMockBuilder::new().await;
    broken.mock_status("getBalance", 502);
    let mut healthy = RpcMockBuilder::new().await;
    healthy.mock_result("getBalance", json!({"context": {"slot": 1}, "value": 42}));

    let config = AppConfig::default();
    let transport = Arc::new(Transport::from_config(&config, metrics()).unwrap());
    transport.update_targets(&[
        endpoint(&broken.url(), &["getBalance"]),
        endpoint(&healthy.url(), &["getBalance"]),
    ]);

    let engine = engine(transport.clone());
    let body = json!({"jsonrpc": "2.0", "id": 3, "method": "getBalance", "params": ["Vote111111111111111111111111111111111111111"]});

    // Whichever target the cursor starts on, the healthy one answers within two attempts.
    let response = app(engine, &config)
        .oneshot(post("application/json", body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, HEADER_NODE_ENDPOINT), healthy.url());
    let attempts: u32 = header(&response, HEADER_NODE_REQ_ATTEMPTS).parse().unwrap();
    assert!((1..=2).contains(&attempts));
    assert_eq!(json_body(response).await["result"]["value"], 42);

    let broken_target = transport.primary().find(&broken.url()).unwrap();
    assert_eq!(broken_target.consecutive_errors(), attempts - 1);
}

#[tokio::test]
#[serial]
async fn test_exhausted_attempts_on_html_error_return_json_rpc_error() {
    let mut node = mockito::Server::new_async().await;
    let mock = node
        .mock("POST", "/")
        .with_status(502)
        .with_header("content-type", "text/html")
        .with_body("<html>Bad Gateway</html>")
        .expect(5)
        .create_async()
        .await;

    let mut config = AppConfig::default();
    let transport = transport_with_failover(&mut config, &[node.url()]);

    let response = app(engine(transport), &config)
        .oneshot(post("application/json", rpc_body("getSlot", 7)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header(&response, "content-type"), "application/json");
    assert_eq!(header(&response, HEADER_NODE_REQ_ATTEMPTS), "5");
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], 2001);
    assert_eq!(body["id"], 7);
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_user_error_passes_through_without_retry() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_error("getAccountInfo", -32602, "Invalid param: Invalid");

    let mut config = AppConfig::default();
    let transport = transport_with_failover(&mut config, &[node.url()]);

    let response = app(engine(transport.clone()), &config)
        .oneshot(post(
            "application/json",
            json!({"jsonrpc": "2.0", "id": 5, "method": "getAccountInfo", "params": ["nope"]}).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, HEADER_NODE_REQ_ATTEMPTS), "1");
    assert_eq!(json_body(response).await["error"]["code"], -32602);

    let target = transport.failover().find(&node.url()).unwrap();
    assert_eq!(target.consecutive_errors(), 0);
}

#[tokio::test]
#[serial]
async fn test_validation_rejects() {
    let config = AppConfig::default();
    let app = app(engine(Arc::new(Transport::from_config(&config, metrics()).unwrap())), &config);

    let response = app
        .clone()
        .oneshot(post("application/json", r#"{"jsonrpc":"1.0","method":"getSlot","id":1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["error"]["code"], -32600);

    let response = app
        .clone()
        .oneshot(post("application/json", r#"{"jsonrpc":"2.0","method":"eth_call","id":1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["error"]["code"], -32601);

    let response = app
        .oneshot(post("text/plain", r#"{"jsonrpc":"2.0","method":"getSlot","id":1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
#[serial]
async fn test_batch_request_is_forwarded_whole() {
    let mut node = mockito::Server::new_async().await;
    let batch_reply = json!([
        {"jsonrpc": "2.0", "id": 1, "result": 281_234_567},
        {"jsonrpc": "2.0", "id": 2, "result": "ok"}
    ]);
    let mock = node
        .mock("POST", "/")
        .match_body(mockito::Matcher::Regex(r#"^\[.*"getSlot".*"getHealth".*\]$"#.to_string()))
        .with_status(200)
        .with_body(batch_reply.to_string())
        .expect(1)
        .create_async()
        .await;

    let mut config = AppConfig::default();
    let transport = transport_with_failover(&mut config, &[node.url()]);
    let body = json!([
        {"jsonrpc": "2.0", "id": 1, "method": "getSlot"},
        {"jsonrpc": "2.0", "id": 2, "method": "getHealth"}
    ]);

    let response = app(engine(transport), &config)
        .oneshot(post("application/json", body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, batch_reply);
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_request_stats_are_persisted() {
    let mut node = RpcMockBuilder::new().await;
    node.mock_result("getSlot", json!(281_234_567));

    let repository = memory_repository().await;
    let mut config = AppConfig::default();
    let transport = transport_with_failover(&mut config, &[node.url()]);
    let stats = Arc::new(StatsCollector::new(repository.clone(), metrics(), &config.stats));
    let engine = Arc::new(ProxyEngine::new(transport, metrics(), Some(stats.clone())));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let flusher = stats.start_with_shutdown(shutdown_rx);

    let app = app(engine, &config);
    for id in 0..3 {
        let response = app.clone().oneshot(post("application/json", rpc_body("getSlot", id))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .oneshot(post("application/json", r#"{"jsonrpc":"2.0","method":"nope","id":1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    shutdown_tx.send(()).unwrap();
    flusher.await.unwrap();

    assert_eq!(stats.buffered(), 0);
    assert_eq!(repository.count_request_stats().await.unwrap(), 4);
}
