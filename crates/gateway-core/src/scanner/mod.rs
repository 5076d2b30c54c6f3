//! # Peer Scanner
//!
//! Continuously discovers network peers and empirically probes which RPC methods
//! each one serves. Results land in peer storage, where the endpoint refresher
//! picks them up for the proxy.
//!
//! ```text
//!   scheduler ──Scan(peer)──► queue ──► worker ──► ChainAdapter::scan_peer ──► storage
//!             ──Discover────►                 └──► ChainAdapter::discover  ──► storage
//! ```
//!
//! Chain-specific work sits behind [`ChainAdapter`]; [`SolanaAdapter`] is the only
//! implementation today. The scheduler and worker pool never look past the trait.
//!
//! ## Per-peer state machine
//!
//! | State | `is_alive` | `is_mainnet` | `is_rpc` | methods |
//! |-------|------------|--------------|----------|---------|
//! | unreachable | false | unchanged | false | all deleted |
//! | wrong network | true | false | false | all deleted |
//! | probed | true | true | true | valid upserted, invalid deleted |

pub mod client;
pub mod probes;
pub mod scheduler;
pub mod solana;
pub mod validators;
pub mod whois;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{storage::{Peer, StorageError}, upstream::TransportError};

pub use client::RpcClient;
pub use probes::{ProbeSettings, Prober};
pub use scheduler::{ScanTask, Scanner, ScannerHandle};
pub use solana::SolanaAdapter;
pub use whois::{IpApiResolver, IpInfoResolver, NoopResolver, WhoisError};

/// Scan failures for one peer or one discovery pass.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Every gossip source failed or returned nothing.
    #[error("No gossip data collected")]
    NoGossip,
}

/// Where a peer ended up after one scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unreachable,
    WrongNetwork,
    Probed,
}

impl ScanState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::WrongNetwork => "wrong_network",
            Self::Probed => "probed",
        }
    }
}

/// Outcome of probing one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub method: &'static str,
    pub valid: bool,
    pub latency: Duration,
}

/// Outcome of scanning one URL, before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub state: ScanState,
    /// `solana-core` version reported by `getVersion`.
    pub version: Option<String>,
    /// Empty unless `state` is [`ScanState::Probed`].
    pub methods: Vec<ProbeResult>,
}

impl ScanReport {
    #[must_use]
    pub fn unreachable() -> Self {
        Self { state: ScanState::Unreachable, version: None, methods: Vec::new() }
    }

    #[must_use]
    pub fn valid_methods(&self) -> impl Iterator<Item = &ProbeResult> {
        self.methods.iter().filter(|p| p.valid)
    }
}

/// Counts from one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Distinct addresses seen in gossip.
    pub seen: usize,
    pub inserted: usize,
    pub updated: usize,
    pub outdated: usize,
}

/// Blockchain-specific scanning. Adding a chain means adding an implementation.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn blockchain(&self) -> &str;

    /// One-time setup before the workers start, e.g. loading the validator set.
    async fn prepare(&self) {}

    /// Scans one peer and persists the outcome.
    async fn scan_peer(&self, peer: &Peer) -> Result<ScanReport, ScanError>;

    /// Enumerates peers via gossip and reconciles them with storage.
    async fn discover(&self) -> Result<DiscoveryReport, ScanError>;
}
