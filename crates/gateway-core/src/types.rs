//! Core type definitions for the JSON-RPC envelope and the Solana method catalog.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`RpcPayload`]: inbound requests, single or batched
//! - [`JsonRpcResponse`], [`JsonRpcError`]: outbound error envelopes built by the gateway
//! - [`UpstreamRpcResponse`]: backend responses as seen by the classifier
//!
//! ## Method Catalog
//! - [`ALLOWED_METHODS`]: every method the proxy accepts
//! - [`SCANNED_METHODS`]: methods the scanner probes on each peer
//!
//! # Batch Handling
//!
//! Single and batched requests are decided once at the parse boundary and exposed
//! uniformly as a slice of requests through [`RpcPayload::requests`], so downstream
//! code never branches on the payload shape.

use ahash::AHashSet;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{borrow::Cow, sync::LazyLock};

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Standard and gateway-specific JSON-RPC error codes.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Solana: transaction signature verification failure.
    pub const SIGNATURE_VERIFICATION_FAILURE: i32 = -32003;
    /// Solana: block not available for slot.
    pub const BLOCK_NOT_AVAILABLE: i32 = -32004;
    /// Solana: transaction precompile verification failure.
    pub const PRECOMPILE_VERIFICATION_FAILURE: i32 = -32006;
    /// Solana: slot was skipped or is missing.
    pub const SLOT_SKIPPED: i32 = -32007;
    /// Solana: slot skipped or missing in long-term storage.
    pub const LONG_TERM_STORAGE_SLOT_SKIPPED: i32 = -32009;
    /// Solana: key excluded from account secondary indexes.
    pub const KEY_EXCLUDED_FROM_SECONDARY_INDEX: i32 = -32010;
    /// Solana: transaction history is not available from this node.
    pub const TRANSACTION_HISTORY_NOT_AVAILABLE: i32 = -32011;
    /// Solana: transaction version not supported by the requester.
    pub const UNSUPPORTED_TRANSACTION_VERSION: i32 = -32015;
    /// Solana: minimum context slot has not been reached.
    pub const MIN_CONTEXT_SLOT_NOT_REACHED: i32 = -32016;

    /// No target in either pool can serve the request.
    pub const NO_AVAILABLE_TARGETS: i32 = 2000;
    /// Every attempt failed without a usable backend response.
    pub const ATTEMPTS_EXCEEDED: i32 = 2001;
    /// The caller went away or the request deadline passed.
    pub const REQUEST_CANCELLED: i32 = 2002;
}

/// Method used to fetch whole blocks. A `null` result for it signals a lagging node.
pub const BLOCK_FETCH_METHOD: &str = "getBlock";

/// Allowed RPC methods - single source of truth for method validation.
pub const ALLOWED_METHODS: &[&str] = &[
    "getAccountInfo",
    "getBalance",
    "getBlock",
    "getBlockCommitment",
    "getBlockHeight",
    "getBlockProduction",
    "getBlockTime",
    "getBlocks",
    "getBlocksWithLimit",
    "getClusterNodes",
    "getEpochInfo",
    "getEpochSchedule",
    "getFeeForMessage",
    "getFirstAvailableBlock",
    "getGenesisHash",
    "getHealth",
    "getHighestSnapshotSlot",
    "getIdentity",
    "getInflationGovernor",
    "getInflationRate",
    "getInflationReward",
    "getLargestAccounts",
    "getLatestBlockhash",
    "getLeaderSchedule",
    "getMaxRetransmitSlot",
    "getMaxShredInsertSlot",
    "getMinimumBalanceForRentExemption",
    "getMultipleAccounts",
    "getProgramAccounts",
    "getRecentPerformanceSamples",
    "getRecentPrioritizationFees",
    "getSignatureStatuses",
    "getSignaturesForAddress",
    "getSlot",
    "getSlotLeader",
    "getSlotLeaders",
    "getStakeActivation",
    "getStakeMinimumDelegation",
    "getSupply",
    "getTokenAccountBalance",
    "getTokenAccountsByDelegate",
    "getTokenAccountsByOwner",
    "getTokenLargestAccounts",
    "getTokenSupply",
    "getTransaction",
    "getTransactionCount",
    "getVersion",
    "getVoteAccounts",
    "isBlockhashValid",
    "minimumLedgerSlot",
    "requestAirdrop",
    "sendTransaction",
    "simulateTransaction",
    // deprecated, still served by older nodes
    "getConfirmedBlock",
    "getConfirmedBlocks",
    "getConfirmedBlocksWithLimit",
    "getConfirmedSignaturesForAddress2",
    "getConfirmedTransaction",
    "getFeeCalculatorForBlockhash",
    "getFeeRateGovernor",
    "getFees",
    "getRecentBlockhash",
    "getSnapshotSlot",
];

/// Methods probed by the scanner on every reachable mainnet peer.
///
/// Also the fallback for the proxy's known-method set while the methods
/// catalog in storage is still empty.
pub const SCANNED_METHODS: &[&str] = &[
    "getAccountInfo",
    "getBalance",
    "getBlock",
    "getBlockHeight",
    "getEpochInfo",
    "getFirstAvailableBlock",
    "getHealth",
    "getLatestBlockhash",
    "getMultipleAccounts",
    "getRecentBlockhash",
    "getSignatureStatuses",
    "getSignaturesForAddress",
    "getSlot",
    "getTokenAccountsByOwner",
    "getTransaction",
    "getVersion",
    "sendTransaction",
    "simulateTransaction",
];

/// Pre-computed `HashSet` for O(1) method lookups
static ALLOWED_METHODS_SET: LazyLock<AHashSet<&'static str>> =
    LazyLock::new(|| ALLOWED_METHODS.iter().copied().collect());

/// Check if a method is in the allowed list (O(1) lookup)
#[inline]
#[must_use]
pub fn is_method_allowed(method: &str) -> bool {
    ALLOWED_METHODS_SET.contains(method)
}

/// JSON-RPC 2.0 request as accepted from clients.
///
/// Decoding is strict: unknown top-level fields are rejected. Missing `jsonrpc`
/// and `method` fields decode to empty strings so the validator can answer them
/// with the proper JSON-RPC error instead of a parse error.
///
/// # Example
///
/// ```
/// use gateway_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("getSlot", None, json!(1));
///
/// assert_eq!(request.method, "getSlot");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), method: method.into(), params, id }
    }
}

/// An inbound payload, decided once from the first byte of the body.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcPayload {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

impl RpcPayload {
    /// Returns every request in the payload; a single request is a batch of one.
    #[must_use]
    pub fn requests(&self) -> &[JsonRpcRequest] {
        match self {
            Self::Single(request) => std::slice::from_ref(request),
            Self::Batch(requests) => requests,
        }
    }

    /// Method names in request order, duplicates included.
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        self.requests().iter().map(|r| r.method.clone()).collect()
    }

    #[must_use]
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 response produced by the gateway itself (rejects and terminal errors).
///
/// Successful responses are never re-encoded; backend bodies are passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn error(code: i32, message: impl Into<String>, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }

    /// Encodes the response for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match serde_json::to_vec(self) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode json-rpc response");
                Bytes::from_static(
                    br#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"internal error"},"id":null}"#,
                )
            }
        }
    }
}

/// A backend response entry as decoded by the response classifier.
///
/// `jsonrpc` stays optional so a missing version is observable, and `result`
/// distinguishes an explicit `null` (`Some(Value::Null)`) from an absent field.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Value,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
