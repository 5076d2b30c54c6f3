//! Decides whether a backend's JSON-RPC answer is a success, a retryable node fault,
//! or a user error that must reach the caller unchanged.

use crate::{
    types::{UpstreamRpcResponse, BLOCK_FETCH_METHOD},
    upstream::errors::RpcErrorCategory,
};

/// Outcome of classifying one backend response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Caller-caused. Never retried.
    UserError { code: i32 },
    /// Backend-caused. The target is penalized and the request retried.
    NodeError { code: Option<i32>, reason: String },
}

impl ResponseClass {
    fn node(reason: &str) -> Self {
        Self::NodeError { code: None, reason: reason.to_string() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// JSON-RPC error code carried by the response, if any.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Success => None,
            Self::UserError { code } => Some(*code),
            Self::NodeError { code, .. } => *code,
        }
    }
}

/// Classifies a backend response body.
///
/// `methods` are the request's methods in order; entry `i` of a batch response is
/// matched with `methods[i]` when checking the null-block rule.
#[must_use]
pub fn classify(body: &[u8], methods: &[String]) -> ResponseClass {
    let trimmed = body.trim_ascii_start();
    let Some(first) = trimmed.first() else {
        return ResponseClass::node("empty response body");
    };

    let entries: Vec<UpstreamRpcResponse> = match first {
        b'{' => match serde_json::from_slice::<UpstreamRpcResponse>(trimmed) {
            Ok(entry) => vec![entry],
            Err(_) => return ResponseClass::node("malformed response body"),
        },
        b'[' => match serde_json::from_slice::<Vec<UpstreamRpcResponse>>(trimmed) {
            Ok(entries) => entries,
            Err(_) => return ResponseClass::node("malformed response body"),
        },
        _ => return ResponseClass::node("malformed response body"),
    };

    if entries.is_empty() {
        return ResponseClass::node("empty response body");
    }

    let mut node_error: Option<ResponseClass> = None;

    for (index, entry) in entries.iter().enumerate() {
        if entry.jsonrpc.is_none() {
            node_error.get_or_insert_with(|| ResponseClass::node("empty response body"));
            continue;
        }

        if let Some(error) = &entry.error {
            match RpcErrorCategory::from_code_and_message(error.code, &error.message) {
                RpcErrorCategory::UserFault => {
                    return ResponseClass::UserError { code: error.code };
                }
                RpcErrorCategory::NodeFault => {
                    node_error.get_or_insert_with(|| ResponseClass::NodeError {
                        code: Some(error.code),
                        reason: error.message.clone(),
                    });
                }
            }
            continue;
        }

        let is_block_fetch = methods
            .get(index)
            .or_else(|| methods.first())
            .is_some_and(|m| m == BLOCK_FETCH_METHOD);
        if is_block_fetch && entry.result.as_ref().is_some_and(serde_json::Value::is_null) {
            node_error.get_or_insert_with(|| ResponseClass::node("empty response field"));
        }
    }

    node_error.unwrap_or(ResponseClass::Success)
}
