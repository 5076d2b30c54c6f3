use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use gateway_core::{config::AppConfig, proxy::{ProxyEngine, RequestContext}};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer,
};

use crate::middleware::{create_request_id_layers, CorrelationId};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProxyEngine>,
    pub request_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Arc<ProxyEngine>, request_timeout: Duration) -> Self {
        Self { engine, request_timeout }
    }
}

/// Proxies one JSON-RPC call or batch.
///
/// Dropping the handler future (client disconnect, server shutdown) cancels the
/// request context, which stops the retry loop between attempts.
pub async fn handle_rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = CorrelationId::from_headers(&headers);
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let mut ctx = RequestContext::new(request_id.as_str())
        .with_timeout(state.request_timeout)
        .with_cancel(cancel);

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let reply = state.engine.handle(&mut ctx, content_type, &body).await;

    tracing::info!(
        request_id = %request_id,
        methods = %ctx.methods_label(),
        status = reply.status,
        attempts = ctx.attempts,
        target = ctx.target.as_deref().unwrap_or("-"),
        elapsed_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
        "rpc request"
    );

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, reply.body).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in reply.headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response_headers.insert(name, value);
        }
    }
    response
}

pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.engine.metrics().get_prometheus_metrics(),
    )
}

/// Reports target availability. Healthy while any target, primary or failover,
/// can take a request.
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let transport = state.engine.transport();
    let primary = transport.primary();
    let failover = transport.failover();
    let healthy = transport.has_available_target();

    let health_status = serde_json::json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "primary": {
            "total": primary.len(),
            "available": primary.available_count(),
        },
        "failover": {
            "total": failover.len(),
            "available": failover.available_count(),
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    (
        if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
        [("content-type", "application/json")],
        serde_json::to_string(&health_status).unwrap_or_default(),
    )
}

/// Builds the HTTP application with request ids, a concurrency cap, a body limit,
/// and response compression.
pub fn create_app(state: AppState, config: &AppConfig) -> Router {
    let (set_request_id, propagate_request_id) = create_request_id_layers();

    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(set_request_id)
                .layer(propagate_request_id)
                .layer(tower::limit::ConcurrencyLimitLayer::new(
                    config.server.max_concurrent_requests,
                ))
                .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use gateway_core::{
        config::FailoverTarget,
        metrics::MetricsCollector,
        proxy::{HEADER_NODE_ENDPOINT, HEADER_NODE_REQ_ATTEMPTS},
        upstream::Transport,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_app(config: &AppConfig) -> Router {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let transport = Arc::new(Transport::from_config(config, metrics.clone()).unwrap());
        let engine = Arc::new(ProxyEngine::new(transport, metrics, None));
        create_app(AppState::new(engine, config.request_timeout()), config)
    }

    fn rpc_request(content_type: &str, body: &str) -> Request<Body> {
        Request::post("/")
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_no_targets_returns_503() {
        let app = test_app(&AppConfig::default());
        let response = app
            .oneshot(rpc_request(
                "application/json",
                r#"{"jsonrpc":"2.0","id":1,"method":"getSlot"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get("x-request-id").is_some());
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], 2000);
        assert_eq!(json["id"], 1);
    }

    #[tokio::test]
    async fn test_wrong_content_type_returns_415() {
        let app = test_app(&AppConfig::default());
        let response = app
            .oneshot(rpc_request("text/plain", r#"{"jsonrpc":"2.0","id":1,"method":"getSlot"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_unknown_method_is_jsonrpc_error() {
        let app = test_app(&AppConfig::default());
        let response = app
            .oneshot(rpc_request(
                "application/json",
                r#"{"jsonrpc":"2.0","id":7,"method":"eth_blockNumber"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_proxies_to_failover_with_node_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":123}"#)
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.failover.push(FailoverTarget { url: server.url(), hourly_quota: 0 });

        let response = test_app(&config)
            .oneshot(rpc_request(
                "application/json",
                r#"{"jsonrpc":"2.0","id":1,"method":"getSlot"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(HEADER_NODE_ENDPOINT).unwrap(), server.url().as_str());
        assert_eq!(response.headers().get(HEADER_NODE_REQ_ATTEMPTS).unwrap(), "1");
        assert_eq!(body_json(response).await["result"], 123);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_reflects_targets() {
        let response = test_app(&AppConfig::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["primary"]["total"], 0);

        let mut config = AppConfig::default();
        config.failover.push(FailoverTarget {
            url: "http://127.0.0.1:1".to_string(),
            hourly_quota: 0,
        });
        let response = test_app(&config)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["failover"]["available"], 1);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = test_app(&AppConfig::default())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4; charset=utf-8"
        );
    }
}
