use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;

use crate::{
    metrics::MetricsCollector,
    middleware::validation::validate_request,
    stats::StatsCollector,
    storage::RequestStat,
    types::{JsonRpcResponse, RpcPayload},
    upstream::Transport,
};

use super::context::RequestContext;

/// URL of the target that produced the answer.
pub const HEADER_NODE_ENDPOINT: &str = "x-node-endpoint";
/// Attempts made across both pools.
pub const HEADER_NODE_REQ_ATTEMPTS: &str = "x-node-req-attempts";
/// Milliseconds spent on the last attempt.
pub const HEADER_NODE_RESPONSE_TIME: &str = "x-node-response-time";

/// What the HTTP front-end writes back.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Bytes,
    /// Node headers as (name, value) pairs.
    pub headers: Vec<(&'static str, String)>,
}

/// Per-request pipeline: validate, forward through the transport, record.
pub struct ProxyEngine {
    transport: Arc<Transport>,
    metrics: Arc<MetricsCollector>,
    stats: Option<Arc<StatsCollector>>,
}

impl ProxyEngine {
    #[must_use]
    pub fn new(
        transport: Arc<Transport>,
        metrics: Arc<MetricsCollector>,
        stats: Option<Arc<StatsCollector>>,
    ) -> Self {
        Self { transport, metrics, stats }
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Processes one inbound request to completion.
    ///
    /// Never fails: every outcome, including rejects and cancellation, becomes a
    /// response, and `ctx` is left describing how the request ended.
    pub async fn handle(
        &self,
        ctx: &mut RequestContext,
        content_type: Option<&str>,
        body: &[u8],
    ) -> ProxyResponse {
        let validated = match validate_request(content_type, body) {
            Ok(validated) => validated,
            Err(rejection) => {
                ctx.user_error = true;
                ctx.error_code = Some(rejection.error.code());
                tracing::debug!(
                    request_id = %ctx.request_id,
                    error = %rejection.error,
                    "request rejected"
                );
                let response = ProxyResponse {
                    status: rejection.http_status(),
                    body: rejection.body(),
                    headers: Vec::new(),
                };
                self.record(ctx, response.status, "invalid");
                return response;
            }
        };

        ctx.methods = validated.methods();
        let reply_id = match &validated.payload {
            RpcPayload::Single(request) => request.id.clone(),
            RpcPayload::Batch(_) => Value::Null,
        };

        let (status, body, outcome) = match self.transport.round_trip(ctx, validated.body).await {
            Ok(reply) => {
                let outcome = if ctx.user_error {
                    "user_error"
                } else if ctx.node_error {
                    "node_error"
                } else {
                    "success"
                };
                (reply.status, reply.body, outcome)
            }
            Err(e) => {
                tracing::debug!(request_id = %ctx.request_id, error = %e, "request failed");
                let body = JsonRpcResponse::error(e.code(), e.to_string(), reply_id).to_bytes();
                (e.http_status(), body, e.outcome())
            }
        };

        let response = ProxyResponse { status, body, headers: Self::node_headers(ctx) };
        self.record(ctx, status, outcome);
        response
    }

    fn node_headers(ctx: &RequestContext) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_NODE_ENDPOINT, ctx.target.clone().unwrap_or_default()),
            (HEADER_NODE_REQ_ATTEMPTS, ctx.attempts.to_string()),
            (HEADER_NODE_RESPONSE_TIME, ctx.response_time.as_millis().to_string()),
        ]
    }

    fn record(&self, ctx: &RequestContext, status: u16, outcome: &'static str) {
        self.metrics.record_request(ctx.metric_method(), outcome, ctx.elapsed(), ctx.attempts);
        if ctx.user_error {
            if let Some(code) = ctx.error_code {
                self.metrics.record_user_error(code);
            }
        }

        tracing::info!(
            request_id = %ctx.request_id,
            methods = %ctx.methods_label(),
            target = ctx.target.as_deref().unwrap_or(""),
            attempts = ctx.attempts,
            status,
            outcome,
            elapsed_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );

        if let Some(stats) = &self.stats {
            stats.record(RequestStat {
                timestamp: Utc::now(),
                methods: ctx.methods_label(),
                endpoint: ctx.target.clone(),
                attempts: ctx.attempts,
                response_time_ms: u64::try_from(ctx.response_time.as_millis()).unwrap_or(u64::MAX),
                http_status: status,
                user_error: ctx.user_error,
                error_code: ctx.error_code,
            });
        }
    }
}
