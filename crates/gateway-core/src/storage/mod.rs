//! # Peer Storage
//!
//! Relational persistence shared by the scanner (writer) and the endpoint refresher
//! (reader). One SQLite database holds:
//!
//! - `peers`: one row per (blockchain, address), never deleted, only flagged outdated
//! - `methods`: per-blockchain method catalog, seeded with the scanned method list
//! - `peer_methods`: capability rows; a row means the method worked on the last scan
//! - `peer_ip_info`: network, ASN, ISP, and country enrichment
//! - `request_stats`: proxy telemetry written by the stats collector
//!
//! All operations go through the [`PeerRepository`] trait so scanner and refresher
//! logic can be tested against an in-memory database.

pub mod repository;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use repository::{PeerRepository, SqliteRepository, SCHEMA};

/// Storage failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value does not fit the model (NULL, out of range, bad encoding).
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(i64),
}

/// A persisted peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub id: i64,
    pub blockchain: String,
    pub address: String,
    pub port: u16,
    pub version: Option<String>,
    pub node_pubkey: Option<String>,
    pub is_rpc: bool,
    pub is_alive: bool,
    pub is_ssl: bool,
    pub is_mainnet: bool,
    pub is_validator: bool,
    pub is_outdated: bool,
    pub updated_at: DateTime<Utc>,
}

impl Peer {
    /// URL the proxy and scanner use to reach this peer's RPC port.
    #[must_use]
    pub fn rpc_url(&self) -> String {
        rpc_url(&self.address, self.port, self.is_ssl)
    }

    /// Whether the refresher should route traffic to this peer.
    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.is_alive && self.is_mainnet && self.is_rpc && !self.is_outdated
    }
}

/// Builds `http(s)://address:port`, bracketing IPv6 literals.
#[must_use]
pub fn rpc_url(address: &str, port: u16, is_ssl: bool) -> String {
    let scheme = if is_ssl { "https" } else { "http" };
    if address.contains(':') {
        format!("{scheme}://[{address}]:{port}")
    } else {
        format!("{scheme}://{address}:{port}")
    }
}

/// A peer about to be inserted by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPeer {
    pub blockchain: String,
    pub address: String,
    pub port: u16,
    pub version: Option<String>,
    pub node_pubkey: Option<String>,
    pub is_ssl: bool,
}

/// Result of one scan cycle, applied in a single update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub is_alive: bool,
    /// `None` leaves the stored flag unchanged.
    pub is_mainnet: Option<bool>,
    pub is_rpc: bool,
    pub is_validator: bool,
    /// `None` leaves the stored version unchanged.
    pub version: Option<String>,
}

/// Network enrichment for a peer's IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IpInfo {
    pub netmask: Option<String>,
    pub asn: Option<i64>,
    pub isp: Option<String>,
    pub country: Option<String>,
}

/// One confirmed method on a peer with its last probe latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodLatency {
    pub method: String,
    pub response_time_ms: i64,
}

/// A peer with its capability set, as read by the endpoint refresher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerCapabilities {
    pub peer: Peer,
    pub methods: Vec<MethodLatency>,
}

/// One finished proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStat {
    pub timestamp: DateTime<Utc>,
    /// Comma-joined method names.
    pub methods: String,
    pub endpoint: Option<String>,
    pub attempts: u32,
    pub response_time_ms: u64,
    pub http_status: u16,
    pub user_error: bool,
    pub error_code: Option<i32>,
}
