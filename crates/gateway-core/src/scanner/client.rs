use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::{
    types::{JsonRpcRequest, UpstreamRpcResponse},
    upstream::HttpClient,
};

use super::ScanError;

/// A timed JSON-RPC call result.
#[derive(Debug)]
pub struct RpcCall {
    pub result: Result<Value, ScanError>,
    pub latency: Duration,
}

/// Minimal JSON-RPC client for probing peers.
///
/// Shares the proxy's [`HttpClient`] so scanner traffic counts against the same
/// concurrency limit.
pub struct RpcClient {
    http: Arc<HttpClient>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    #[must_use]
    pub fn new(http: Arc<HttpClient>, timeout: Duration) -> Self {
        Self { http, timeout, next_id: AtomicU64::new(1) }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Calls `method` on `url` and measures the round trip.
    ///
    /// A JSON-RPC error object becomes [`ScanError::Rpc`]; the latency is measured
    /// either way.
    pub async fn call(&self, url: &str, method: &str, params: Option<Value>) -> RpcCall {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, Value::from(id));

        let started = Instant::now();
        let result = self.send(url, &request).await;
        RpcCall { result, latency: started.elapsed() }
    }

    async fn send(&self, url: &str, request: &JsonRpcRequest) -> Result<Value, ScanError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| ScanError::InvalidResponse(format!("encode: {e}")))?;

        let reply = self.http.send_request(url, body.into(), self.timeout).await?;
        if !reply.is_success() {
            return Err(ScanError::HttpStatus(reply.status));
        }

        let response: UpstreamRpcResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| ScanError::InvalidResponse(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(ScanError::Rpc { code: error.code, message: error.message });
        }

        response
            .result
            .ok_or_else(|| ScanError::InvalidResponse("missing result".to_string()))
    }
}
