use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Per-request state threaded through validation, transport, and recording.
///
/// Each stage writes the fields it owns; later stages only read them, so nothing
/// downstream has to re-parse bodies to learn how a request ended.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Requested methods in request order.
    pub methods: Vec<String>,
    /// Set when the caller, not a backend, is at fault.
    pub user_error: bool,
    /// Set when the final answer is a backend fault passed through after retries.
    pub node_error: bool,
    /// JSON-RPC error code of the final answer, if it carried one.
    pub error_code: Option<i32>,
    /// URL of the target that produced the final answer.
    pub target: Option<String>,
    /// Attempts made across both pools.
    pub attempts: u32,
    /// Latency of the last attempt.
    pub response_time: Duration,
    pub started: Instant,
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            methods: Vec::new(),
            user_error: false,
            node_error: false,
            error_code: None,
            target: None,
            attempts: 0,
            response_time: Duration::ZERO,
            started: Instant::now(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Sets the deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(self.started + timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `true` once the token fired or the deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, or `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Comma-joined method names, as persisted in request stats.
    #[must_use]
    pub fn methods_label(&self) -> String {
        self.methods.join(",")
    }

    /// Label used for per-method metrics: the method itself, or `batch`.
    #[must_use]
    pub fn metric_method(&self) -> &str {
        match self.methods.as_slice() {
            [single] => single.as_str(),
            [] => "unknown",
            _ => "batch",
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
