//! RPC Mock Builder for Solana JSON-RPC Testing
//!
//! Wraps mockito so a test can stand up a fake Solana node method by method.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

use super::test_helpers::{
    KNOWN_ACCOUNT_OWNER, MAINNET_GENESIS, TEST_BLOCKHASH, TEST_SIGNATURE, TEST_SLOT,
};

/// Builder for mock Solana RPC responses.
///
/// Every mock matches on the `method` field only, so register each method once.
pub struct RpcMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl RpcMockBuilder {
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// `host:port` of the mock server, as gossip would advertise it.
    #[must_use]
    pub fn host_with_port(&self) -> String {
        self.server.host_with_port()
    }

    fn method_matcher(method: &str) -> Matcher {
        Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#))
    }

    /// Answers `method` with a successful `result`.
    pub fn mock_result(&mut self, method: &str, result: Value) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Self::method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
            .create();

        self.mocks.push(mock);
        self
    }

    /// Answers `method` with a JSON-RPC error object.
    pub fn mock_error(&mut self, method: &str, code: i32, message: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Self::method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": code, "message": message}
                })
                .to_string(),
            )
            .create();

        self.mocks.push(mock);
        self
    }

    /// Answers `method` with a bare HTTP status and an empty body.
    pub fn mock_status(&mut self, method: &str, status: usize) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Self::method_matcher(method))
            .with_status(status)
            .create();

        self.mocks.push(mock);
        self
    }

    /// Registers a mainnet node that passes every probe.
    pub fn mock_healthy_node(&mut self) -> &mut Self {
        self.mock_result("getVersion", json!({"solana-core": "1.18.22", "feature-set": 3_469_865_029_u64}))
            .mock_result("getGenesisHash", json!(MAINNET_GENESIS))
            .mock_result("getHealth", json!("ok"))
            .mock_result("getSlot", json!(TEST_SLOT))
            .mock_result("getBlockHeight", json!(TEST_SLOT - 18_000_000))
            .mock_result(
                "getEpochInfo",
                json!({"absoluteSlot": TEST_SLOT, "epoch": 651, "slotIndex": 1200, "slotsInEpoch": 432_000}),
            )
            .mock_result("getFirstAvailableBlock", json!(0))
            .mock_result(
                "getBlock",
                json!({"blockhash": TEST_BLOCKHASH, "parentSlot": TEST_SLOT - 101, "blockHeight": 1}),
            )
            .mock_result(
                "getLatestBlockhash",
                json!({"context": {"slot": TEST_SLOT}, "value": {"blockhash": TEST_BLOCKHASH, "lastValidBlockHeight": 1}}),
            )
            .mock_result(
                "getRecentBlockhash",
                json!({"context": {"slot": TEST_SLOT}, "value": {"blockhash": TEST_BLOCKHASH}}),
            )
            .mock_result(
                "getAccountInfo",
                json!({"context": {"slot": TEST_SLOT}, "value": {"owner": KNOWN_ACCOUNT_OWNER, "lamports": 1_169_280}}),
            )
            .mock_result(
                "getMultipleAccounts",
                json!({"context": {"slot": TEST_SLOT}, "value": [{"owner": KNOWN_ACCOUNT_OWNER, "lamports": 1_169_280}]}),
            )
            .mock_result("getBalance", json!({"context": {"slot": TEST_SLOT}, "value": 1_169_280}))
            .mock_result("getTokenAccountsByOwner", json!({"context": {"slot": TEST_SLOT}, "value": []}))
            .mock_result(
                "getSignaturesForAddress",
                json!([{"signature": TEST_SIGNATURE, "slot": TEST_SLOT - 5, "err": null}]),
            )
            .mock_result("getTransaction", json!({"slot": TEST_SLOT - 5, "meta": {"err": null}}))
            .mock_result(
                "getSignatureStatuses",
                json!({"context": {"slot": TEST_SLOT}, "value": [{"slot": TEST_SLOT - 5, "confirmations": null}]}),
            )
            .mock_error("sendTransaction", -32602, "invalid transaction: Transaction failed to sanitize accounts offsets correctly")
            .mock_error("simulateTransaction", -32602, "invalid transaction: Transaction failed to sanitize accounts offsets correctly")
    }
}
