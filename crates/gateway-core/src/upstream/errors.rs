use crate::types::codes;
use thiserror::Error;

/// Error codes that mean the caller sent something the node rightly refused.
///
/// A response carrying one of these is returned to the caller as-is and never retried,
/// unless its message matches one of [`NODE_FAULT_MESSAGES`].
pub const USER_FAULT_CODES: &[i32] = &[
    codes::INVALID_PARAMS,
    codes::PARSE_ERROR,
    codes::INVALID_REQUEST,
    codes::SIGNATURE_VERIFICATION_FAILURE,
    codes::PRECOMPILE_VERIFICATION_FAILURE,
    codes::UNSUPPORTED_TRANSACTION_VERSION,
];

/// Message fragments (lowercase) that turn a user-fault code back into a node fault.
///
/// Nodes reuse client-error codes for storage failures and slow-query timeouts.
pub const NODE_FAULT_MESSAGES: &[&str] = &["blockstore error", "request timed out"];

/// Classification of a JSON-RPC error returned by a backend node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCategory {
    /// The request itself is at fault. Surface verbatim, do not retry.
    UserFault,
    /// The node is at fault. Penalize it and retry elsewhere.
    NodeFault,
}

impl RpcErrorCategory {
    /// Classifies an error by code first, then corrects known misclassifications
    /// by message.
    ///
    /// # Example
    ///
    /// ```
    /// use gateway_core::upstream::RpcErrorCategory;
    ///
    /// assert_eq!(
    ///     RpcErrorCategory::from_code_and_message(-32602, "Invalid param: WrongSize"),
    ///     RpcErrorCategory::UserFault
    /// );
    /// assert_eq!(
    ///     RpcErrorCategory::from_code_and_message(-32602, "blockstore error"),
    ///     RpcErrorCategory::NodeFault
    /// );
    /// ```
    #[must_use]
    pub fn from_code_and_message(code: i32, message: &str) -> Self {
        if !USER_FAULT_CODES.contains(&code) {
            return Self::NodeFault;
        }

        let message_lower = message.to_lowercase();
        if NODE_FAULT_MESSAGES.iter().any(|pattern| message_lower.contains(pattern)) {
            Self::NodeFault
        } else {
            Self::UserFault
        }
    }
}

/// Errors raised while talking to a backend node.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Request exceeded the configured timeout duration.
    #[error("Request timeout")]
    Timeout,

    /// Failed to reach the node. The message is sanitized and never contains the URL.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The HTTP client's concurrency semaphore is exhausted or closed.
    #[error("Concurrency limit reached: {0}")]
    ConcurrencyLimit(String),

    /// The response body could not be read.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("Client build failed: {0}")]
    ClientBuild(String),

    /// A configured target URL is not an absolute http(s) URL.
    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Short label for log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::ConcurrencyLimit(_) => "concurrency_limit",
            Self::InvalidResponse(_) => "invalid_response",
            Self::ClientBuild(_) => "client_build",
            Self::InvalidUrl(_) => "invalid_url",
        }
    }
}
