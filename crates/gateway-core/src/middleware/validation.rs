use bytes::Bytes;
use serde_json::Value;

use crate::types::{codes, is_method_allowed, JsonRpcRequest, JsonRpcResponse, RpcPayload, JSONRPC_VERSION};

/// Content type every inbound request must carry.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Request rejects produced before anything reaches the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Content type is not `application/json`.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Body is empty after whitespace stripping.
    #[error("Parse error: empty body")]
    EmptyBody,

    /// Body is not a JSON-RPC object or array of objects.
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON-RPC version is not "2.0".
    #[error("Invalid JSON-RPC version: {0}")]
    InvalidVersion(String),

    /// Batch with no entries.
    #[error("Invalid request: empty batch")]
    EmptyBatch,

    /// Requested method is not in the allowlist.
    #[error("Method not found: {0}")]
    MethodNotAllowed(String),
}

impl ValidationError {
    /// Wrong content type is the only reject that is not HTTP 200.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::UnsupportedContentType(_) => 415,
            _ => 200,
        }
    }

    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::UnsupportedContentType(_) | Self::InvalidVersion(_) | Self::EmptyBatch => {
                codes::INVALID_REQUEST
            }
            Self::EmptyBody | Self::Parse(_) => codes::PARSE_ERROR,
            Self::MethodNotAllowed(_) => codes::METHOD_NOT_FOUND,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::UnsupportedContentType(_) => {
                format!("Invalid request: content type must be {JSON_CONTENT_TYPE}")
            }
            Self::EmptyBody | Self::Parse(_) => "Parse error".to_string(),
            Self::InvalidVersion(_) | Self::EmptyBatch => "Invalid request".to_string(),
            Self::MethodNotAllowed(_) => "Method not found".to_string(),
        }
    }
}

/// A rejected request: what went wrong and the id to answer with.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub error: ValidationError,
    pub id: Value,
}

impl Rejection {
    fn new(error: ValidationError) -> Self {
        Self { error, id: Value::Null }
    }

    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.error.http_status()
    }

    /// JSON-RPC error body sent to the caller.
    #[must_use]
    pub fn body(&self) -> Bytes {
        JsonRpcResponse::error(self.error.code(), self.error.public_message(), self.id.clone())
            .to_bytes()
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub payload: RpcPayload,
    /// Whitespace-stripped body, forwarded to backends.
    pub body: Bytes,
}

impl ValidatedRequest {
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        self.payload.methods()
    }
}

/// Returns `true` for `application/json`, ignoring parameters and case.
#[must_use]
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

/// Removes whitespace outside of JSON string literals.
#[must_use]
pub fn strip_whitespace(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut in_string = false;
    let mut escaped = false;

    for &byte in body {
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        if byte.is_ascii_whitespace() {
            continue;
        }
        if byte == b'"' {
            in_string = true;
        }
        out.push(byte);
    }

    out
}

/// Validates an inbound request body.
///
/// Batches are all-or-nothing: the first bad entry rejects the whole request.
///
/// # Errors
///
/// Returns a [`Rejection`] describing the first problem found.
pub fn validate_request(content_type: Option<&str>, body: &[u8]) -> Result<ValidatedRequest, Rejection> {
    if !is_json_content_type(content_type) {
        return Err(Rejection::new(ValidationError::UnsupportedContentType(
            content_type.unwrap_or_default().to_string(),
        )));
    }

    let stripped = strip_whitespace(body);
    let payload = match stripped.first() {
        None => return Err(Rejection::new(ValidationError::EmptyBody)),
        Some(b'{') => serde_json::from_slice::<JsonRpcRequest>(&stripped)
            .map(RpcPayload::Single)
            .map_err(|e| Rejection::new(ValidationError::Parse(e.to_string())))?,
        Some(b'[') => serde_json::from_slice::<Vec<JsonRpcRequest>>(&stripped)
            .map(RpcPayload::Batch)
            .map_err(|e| Rejection::new(ValidationError::Parse(e.to_string())))?,
        Some(_) => {
            return Err(Rejection::new(ValidationError::Parse("expected object or array".into())))
        }
    };

    if payload.requests().is_empty() {
        return Err(Rejection::new(ValidationError::EmptyBatch));
    }

    for request in payload.requests() {
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(Rejection {
                error: ValidationError::InvalidVersion(request.jsonrpc.clone()),
                id: request.id.clone(),
            });
        }
        if !is_method_allowed(&request.method) {
            return Err(Rejection {
                error: ValidationError::MethodNotAllowed(request.method.clone()),
                id: request.id.clone(),
            });
        }
    }

    Ok(ValidatedRequest { payload, body: Bytes::from(stripped) })
}
