//! Per-method result checks.
//!
//! A probe only counts when the call succeeds and the answer looks right. Every check
//! here is a pure function of the decoded `result` so it can be tested without a node.

use serde_json::Value;

use crate::types::codes;

/// Known values a healthy mainnet node must return.
#[derive(Debug, Clone, Copy)]
pub struct Expectations<'a> {
    /// Owner of the probed account (`getAccountInfo`, `getMultipleAccounts`).
    pub account_owner: &'a str,
}

/// Methods probed with a deliberately broken transaction.
///
/// For these a specific rejection is the success case.
#[must_use]
pub fn expects_rejection(method: &str) -> bool {
    matches!(method, "sendTransaction" | "simulateTransaction")
}

/// Whether an error proves the method ran end to end.
///
/// The probe transaction deserializes but fails sanitization, which the node reports as
/// invalid params. Any other error means the method is broken or disabled.
#[must_use]
pub fn is_expected_rejection(method: &str, code: i32) -> bool {
    expects_rejection(method) && code == codes::INVALID_PARAMS
}

/// Checks a successful `result` for `method`.
#[must_use]
pub fn validate_result(method: &str, result: &Value, expect: &Expectations<'_>) -> bool {
    match method {
        "getVersion" => true,
        "getHealth" => result.as_str() == Some("ok"),
        "getSlot" | "getBlockHeight" => positive(result),
        "getFirstAvailableBlock" => result.is_u64(),
        "getEpochInfo" => positive(&result["absoluteSlot"]) && result["epoch"].is_u64(),
        "getBalance" => positive(&result["value"]),
        "getAccountInfo" => owner_matches(&result["value"], expect.account_owner),
        "getMultipleAccounts" => result["value"]
            .as_array()
            .and_then(|accounts| accounts.first())
            .is_some_and(|account| owner_matches(account, expect.account_owner)),
        "getLatestBlockhash" | "getRecentBlockhash" => non_empty_str(&result["value"]["blockhash"]),
        "getBlock" => non_empty_str(&result["blockhash"]),
        "getSignaturesForAddress" => result
            .as_array()
            .and_then(|entries| entries.first())
            .is_some_and(|entry| non_empty_str(&entry["signature"])),
        "getTransaction" => positive(&result["slot"]),
        "getSignatureStatuses" => result["value"]
            .as_array()
            .and_then(|statuses| statuses.first())
            .is_some_and(Value::is_object),
        "getTokenAccountsByOwner" => result["value"].is_array(),
        // A broken transaction must never be accepted.
        "sendTransaction" | "simulateTransaction" => false,
        _ => !result.is_null(),
    }
}

fn positive(value: &Value) -> bool {
    value.as_u64().is_some_and(|n| n > 0)
}

fn non_empty_str(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.is_empty())
}

fn owner_matches(account: &Value, owner: &str) -> bool {
    account["owner"].as_str() == Some(owner)
}
