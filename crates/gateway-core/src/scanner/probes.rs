use std::{sync::Arc, time::Duration};

use serde_json::{json, Value};

use crate::{config::ScannerConfig, metrics::MetricsCollector, types::codes};

use super::{
    client::{RpcCall, RpcClient},
    validators::{is_expected_rejection, validate_result, Expectations},
    ProbeResult, ScanError, ScanReport, ScanState,
};

/// Probe order. Later probes reuse values from earlier ones (slot, signature).
pub const PROBE_ORDER: &[&str] = &[
    "getVersion",
    "getHealth",
    "getSlot",
    "getBlockHeight",
    "getEpochInfo",
    "getFirstAvailableBlock",
    "getBlock",
    "getLatestBlockhash",
    "getRecentBlockhash",
    "getAccountInfo",
    "getMultipleAccounts",
    "getBalance",
    "getTokenAccountsByOwner",
    "getSignaturesForAddress",
    "getTransaction",
    "getSignatureStatuses",
    "sendTransaction",
    "simulateTransaction",
];

/// Slots subtracted from the probed tip before fetching a block, so the block is
/// confirmed on every healthy node.
pub const BLOCK_SAFETY_LAG: u64 = 100;

const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Legacy transaction with one required signer and no account keys. It decodes,
/// then fails sanitization before any signature or balance check.
pub const UNSANITIZABLE_TRANSACTION: &str = "AQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Methods the network has deprecated; nodes may legitimately not serve them.
const DEPRECATED_METHODS: &[&str] = &["getRecentBlockhash"];

/// Error codes that say "not available here" rather than "broken".
///
/// The method is still marked invalid, only the log level changes.
#[must_use]
pub fn is_benign(method: &str, code: i32) -> bool {
    match code {
        codes::METHOD_NOT_FOUND => DEPRECATED_METHODS.contains(&method),
        codes::BLOCK_NOT_AVAILABLE | codes::SLOT_SKIPPED | codes::LONG_TERM_STORAGE_SLOT_SKIPPED => {
            method == "getBlock"
        }
        codes::TRANSACTION_HISTORY_NOT_AVAILABLE => {
            matches!(method, "getTransaction" | "getSignaturesForAddress")
        }
        codes::KEY_EXCLUDED_FROM_SECONDARY_INDEX => method == "getTokenAccountsByOwner",
        codes::MIN_CONTEXT_SLOT_NOT_REACHED => true,
        _ => false,
    }
}

/// Network identity and well-known accounts used to judge probe answers.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub genesis_hash: String,
    pub known_account: String,
    pub known_account_owner: String,
    pub known_signature_address: String,
}

impl From<&ScannerConfig> for ProbeSettings {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            genesis_hash: config.genesis_hash.clone(),
            known_account: config.known_account.clone(),
            known_account_owner: config.known_account_owner.clone(),
            known_signature_address: config.known_signature_address.clone(),
        }
    }
}

/// Values carried from one probe to the next.
#[derive(Debug, Default)]
struct ProbeContext {
    slot: Option<u64>,
    signature: Option<String>,
}

impl ProbeContext {
    fn learn(&mut self, method: &str, result: &Value) {
        match method {
            "getSlot" => self.slot = result.as_u64(),
            "getSignaturesForAddress" => {
                self.signature = result
                    .as_array()
                    .and_then(|entries| entries.first())
                    .and_then(|entry| entry["signature"].as_str())
                    .map(str::to_string);
            }
            _ => {}
        }
    }
}

/// Probes a single RPC URL. Does not touch storage.
pub struct Prober {
    client: RpcClient,
    settings: ProbeSettings,
    metrics: Arc<MetricsCollector>,
}

impl Prober {
    #[must_use]
    pub fn new(client: RpcClient, settings: ProbeSettings, metrics: Arc<MetricsCollector>) -> Self {
        Self { client, settings, metrics }
    }

    #[must_use]
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Runs the reachability and identity checks, then every method probe.
    pub async fn probe_url(&self, url: &str) -> ScanReport {
        let version_call = self.client.call(url, "getVersion", None).await;
        let version = match &version_call.result {
            Ok(value) => value["solana-core"].as_str().map(str::to_string),
            Err(e) => {
                tracing::debug!(url, error = %e, "peer unreachable");
                return ScanReport::unreachable();
            }
        };

        match self.client.call(url, "getGenesisHash", None).await.result {
            Ok(hash) if hash.as_str() == Some(self.settings.genesis_hash.as_str()) => {}
            Ok(hash) => {
                tracing::debug!(url, genesis = %hash, "peer on another network");
                return ScanReport { state: ScanState::WrongNetwork, version, methods: Vec::new() };
            }
            Err(ScanError::Rpc { code, message }) => {
                tracing::debug!(url, code, message = %message, "genesis hash unavailable");
                return ScanReport { state: ScanState::WrongNetwork, version, methods: Vec::new() };
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "peer unreachable during identity check");
                return ScanReport::unreachable();
            }
        }

        let mut ctx = ProbeContext::default();
        let mut methods = Vec::with_capacity(PROBE_ORDER.len());
        for &method in PROBE_ORDER {
            let result = if method == "getVersion" {
                // Reachability already proved it.
                ProbeResult { method, valid: true, latency: version_call.latency }
            } else {
                self.probe_method(url, method, &mut ctx).await
            };
            self.metrics.record_probe(method, result.valid);
            methods.push(result);
        }

        ScanReport { state: ScanState::Probed, version, methods }
    }

    async fn probe_method(&self, url: &str, method: &'static str, ctx: &mut ProbeContext) -> ProbeResult {
        let Some(params) = self.params(method, ctx) else {
            tracing::debug!(url, method, "probe skipped, missing input from earlier probe");
            return ProbeResult { method, valid: false, latency: Duration::ZERO };
        };

        let call = self.client.call(url, method, params).await;
        let valid = self.evaluate(url, method, &call);
        if valid {
            if let Ok(result) = &call.result {
                ctx.learn(method, result);
            }
        }
        ProbeResult { method, valid, latency: call.latency }
    }

    fn evaluate(&self, url: &str, method: &str, call: &RpcCall) -> bool {
        let expect = Expectations { account_owner: &self.settings.known_account_owner };
        match &call.result {
            Ok(result) => {
                let valid = validate_result(method, result, &expect);
                if !valid {
                    tracing::debug!(url, method, "unexpected probe result");
                }
                valid
            }
            Err(ScanError::Rpc { code, .. }) if is_expected_rejection(method, *code) => true,
            Err(ScanError::Rpc { code, message }) if is_benign(method, *code) => {
                tracing::debug!(url, method, code = *code, message = %message, "method not available");
                false
            }
            Err(e) => {
                tracing::warn!(url, method, error = %e, "probe failed");
                false
            }
        }
    }

    fn params(&self, method: &str, ctx: &ProbeContext) -> Option<Option<Value>> {
        let s = &self.settings;
        let params = match method {
            "getBlock" => {
                let slot = ctx.slot?.saturating_sub(BLOCK_SAFETY_LAG);
                Some(json!([slot, {
                    "encoding": "json",
                    "transactionDetails": "none",
                    "rewards": false,
                    "maxSupportedTransactionVersion": 0
                }]))
            }
            "getAccountInfo" => Some(json!([s.known_account, {"encoding": "base64"}])),
            "getMultipleAccounts" => Some(json!([[s.known_account], {"encoding": "base64"}])),
            "getBalance" => Some(json!([s.known_account])),
            "getTokenAccountsByOwner" => Some(json!([
                s.known_account,
                {"programId": TOKEN_PROGRAM_ID},
                {"encoding": "jsonParsed"}
            ])),
            "getSignaturesForAddress" => Some(json!([s.known_signature_address, {"limit": 1}])),
            "getTransaction" => {
                let signature = ctx.signature.as_ref()?;
                Some(json!([signature, {"encoding": "json", "maxSupportedTransactionVersion": 0}]))
            }
            "getSignatureStatuses" => {
                let signature = ctx.signature.as_ref()?;
                Some(json!([[signature], {"searchTransactionHistory": true}]))
            }
            "sendTransaction" => Some(json!([UNSANITIZABLE_TRANSACTION, {"encoding": "base64"}])),
            "simulateTransaction" => Some(json!([
                UNSANITIZABLE_TRANSACTION,
                {"encoding": "base64", "sigVerify": false}
            ])),
            _ => None,
        };
        Some(params)
    }
}
