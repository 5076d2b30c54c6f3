use crate::{types::codes, upstream::errors::TransportError};

/// HTTP status nginx popularized for "client closed request".
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

/// Terminal failures of the proxy pipeline.
///
/// Each variant maps to the HTTP status and JSON-RPC code the caller receives.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No available targets")]
    NoAvailableTargets,

    #[error("Attempts exceeded")]
    AttemptsExceeded,

    /// Preserves the concrete `TransportError` of the last attempt.
    #[error("Upstream unreachable: {0}")]
    Upstream(#[from] TransportError),

    #[error("Request cancelled")]
    Cancelled,
}

impl ProxyError {
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoAvailableTargets => 503,
            Self::AttemptsExceeded | Self::Upstream(_) => 500,
            Self::Cancelled => STATUS_CLIENT_CLOSED_REQUEST,
        }
    }

    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::NoAvailableTargets => codes::NO_AVAILABLE_TARGETS,
            Self::AttemptsExceeded | Self::Upstream(_) => codes::ATTEMPTS_EXCEEDED,
            Self::Cancelled => codes::REQUEST_CANCELLED,
        }
    }

    /// Outcome label for `gateway_requests_total`.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NoAvailableTargets => "no_target",
            Self::AttemptsExceeded | Self::Upstream(_) => "node_error",
            Self::Cancelled => "cancelled",
        }
    }
}
