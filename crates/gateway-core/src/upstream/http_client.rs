use bytes::Bytes;
use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::upstream::TransportError;

/// Configuration for HTTP client concurrency and timeout behavior.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum number of concurrent HTTP requests allowed
    pub concurrent_limit: usize,
    /// Permit acquisition timeout in milliseconds under normal load
    pub permit_timeout_ms: u64,
    /// Permit acquisition timeout in milliseconds when permits are scarce
    pub permit_timeout_scarce_ms: u64,
    /// Number of available permits below which they are considered scarce
    pub scarce_permit_threshold: usize,
    /// User agent sent to backend nodes
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: 2000,
            permit_timeout_ms: 500,
            permit_timeout_scarce_ms: 200,
            scarce_permit_threshold: 100,
            user_agent: concat!("solana-rpc-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Raw answer from a backend node.
///
/// Non-2xx statuses are not errors at this layer: the transport decides what a
/// status means for the target's health.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

impl HttpReply {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client with semaphore-based concurrency control.
///
/// Performs exactly one POST per call. Retrying across targets is the transport's job.
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: HttpClientConfig,
}

/// RAII guard ensuring semaphore permits are always released.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl PermitGuard {
    fn new(permit: OwnedSemaphorePermit, semaphore: Arc<Semaphore>) -> Self {
        Self { _permit: permit, semaphore }
    }

    fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "permit guard dropped"
        );
    }
}

// No Default impl: building the reqwest client can fail.

impl HttpClient {
    /// Creates a new HTTP client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Creates a new HTTP client with the specified concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_concurrency_limit(concurrent_limit: usize) -> Result<Self, TransportError> {
        Self::with_config(HttpClientConfig { concurrent_limit, ..Default::default() })
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(64)
            .connect_timeout(Duration::from_secs(5))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.as_str())
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                TransportError::ClientBuild(e.to_string())
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit.max(1))),
            config,
        })
    }

    /// Sanitizes network errors so node URLs never leak into responses or logs.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_redirect() {
            "redirect refused".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Sends one JSON POST and returns the status and full body.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if permit acquisition or the request times out
    /// - [`TransportError::ConcurrencyLimit`] if the semaphore is closed
    /// - [`TransportError::ConnectionFailed`] for network-related failures
    /// - [`TransportError::InvalidResponse`] if the body cannot be read
    pub async fn send_request(
        &self,
        url: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        let permit_timeout =
            if self.concurrent_limit.available_permits() < self.config.scarce_permit_threshold {
                Duration::from_millis(self.config.permit_timeout_scarce_ms)
            } else {
                Duration::from_millis(self.config.permit_timeout_ms)
            };

        let permit = tokio::time::timeout(
            permit_timeout,
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                available_permits = self.concurrent_limit.available_permits(),
                "http client semaphore acquisition timeout"
            );
            TransportError::Timeout
        })?
        .map_err(|_| TransportError::ConcurrencyLimit("semaphore closed".to_string()))?;

        let permit_guard = PermitGuard::new(permit, Arc::clone(&self.concurrent_limit));

        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::trace!(
                    available_permits = permit_guard.available_permits(),
                    "http request error"
                );
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::ConnectionFailed(Self::sanitize_network_error(&e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::InvalidResponse(Self::sanitize_network_error(&e))
            }
        })?;

        tracing::trace!(
            status = status,
            available_permits = permit_guard.available_permits(),
            "http request completed"
        );

        Ok(HttpReply { status, body })
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.concurrent_limit, 2000);
        assert_eq!(config.permit_timeout_ms, 500);
        assert!(config.user_agent.starts_with("solana-rpc-gateway/"));
    }

    #[test]
    fn test_reply_success_range() {
        let ok = HttpReply { status: 200, body: Bytes::new() };
        let redirect = HttpReply { status: 301, body: Bytes::new() };
        let server_error = HttpReply { status: 502, body: Bytes::new() };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
        assert!(!server_error.is_success());
    }

    #[tokio::test]
    async fn test_permit_guard_releases_on_drop() {
        let semaphore = Arc::new(Semaphore::new(10));

        {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let guard = PermitGuard::new(permit, semaphore.clone());
            assert_eq!(guard.available_permits(), 9);
        }

        assert_eq!(semaphore.available_permits(), 10);
    }

    #[tokio::test]
    async fn test_permit_acquisition_timeout() {
        let config = HttpClientConfig {
            concurrent_limit: 1,
            permit_timeout_ms: 50,
            permit_timeout_scarce_ms: 25,
            scarce_permit_threshold: 1,
            ..Default::default()
        };
        let client = HttpClient::with_config(config).unwrap();

        let permit = client.concurrent_limit.clone().acquire_owned().await.unwrap();
        let _guard = PermitGuard::new(permit, client.concurrent_limit.clone());

        let result = client
            .send_request("http://localhost:1", Bytes::from("{}"), Duration::from_secs(5))
            .await;

        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned_not_raised() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("upstream overloaded")
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let reply =
            client.send_request(&server.url(), Bytes::from("{}"), Duration::from_secs(2)).await.unwrap();

        assert_eq!(reply.status, 503);
        assert_eq!(reply.body, Bytes::from("upstream overloaded"));
        assert_eq!(client.available_permits(), 2000);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_sanitized() {
        let client = HttpClient::new().unwrap();
        let result = client
            .send_request("http://127.0.0.1:1", Bytes::from("{}"), Duration::from_millis(500))
            .await;

        match result {
            Err(TransportError::ConnectionFailed(msg)) => assert!(!msg.contains("127.0.0.1")),
            Err(TransportError::Timeout) => {}
            other => panic!("expected connection failure, got {other:?}"),
        }
        assert_eq!(client.available_permits(), 2000);
    }
}
