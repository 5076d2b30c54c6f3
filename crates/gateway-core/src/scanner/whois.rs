use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::IpInfo;

#[derive(Error, Debug)]
pub enum WhoisError {
    #[error("Lookup request failed: {0}")]
    Request(String),

    #[error("Lookup rejected for {ip}: {message}")]
    Rejected { ip: String, message: String },

    #[error("Invalid IP address: {0}")]
    InvalidIp(String),
}

/// Network, ASN, and country lookup for a peer IP.
#[async_trait]
pub trait IpInfoResolver: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<IpInfo, WhoisError>;
}

/// Resolver used when enrichment is disabled. Every lookup fails, so peers are
/// inserted without an ip-info row.
pub struct NoopResolver;

#[async_trait]
impl IpInfoResolver for NoopResolver {
    async fn lookup(&self, ip: &str) -> Result<IpInfo, WhoisError> {
        Err(WhoisError::Rejected { ip: ip.to_string(), message: "enrichment disabled".to_string() })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    /// e.g. `AS16509 Amazon.com, Inc.`
    #[serde(default, rename = "as")]
    as_name: Option<String>,
}

/// Client for an ip-api compatible `GET {base}/json/{ip}` service.
pub struct IpApiResolver {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiResolver {
    /// # Errors
    ///
    /// Returns [`WhoisError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WhoisError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WhoisError::Request(e.to_string()))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl IpInfoResolver for IpApiResolver {
    async fn lookup(&self, ip: &str) -> Result<IpInfo, WhoisError> {
        let addr: IpAddr = ip.parse().map_err(|_| WhoisError::InvalidIp(ip.to_string()))?;

        let url = format!("{}/json/{ip}", self.base_url);
        let response: IpApiResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WhoisError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| WhoisError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| WhoisError::Request(e.to_string()))?;

        if response.status != "success" {
            return Err(WhoisError::Rejected {
                ip: ip.to_string(),
                message: response.message.unwrap_or(response.status),
            });
        }

        Ok(IpInfo {
            netmask: Some(network_of(addr)),
            asn: response.as_name.as_deref().and_then(parse_asn),
            isp: response.isp.filter(|s| !s.is_empty()),
            country: response.country_code.filter(|s| !s.is_empty()),
        })
    }
}

/// Extracts the number from `AS16509 Amazon.com, Inc.`.
fn parse_asn(as_name: &str) -> Option<i64> {
    as_name.split_whitespace().next()?.strip_prefix("AS")?.parse().ok()
}

/// The /24 (IPv4) or /48 (IPv6) network the address belongs to.
fn network_of(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            format!("{a}.{b}.{c}.0/24")
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}::/48", s[0], s[1], s[2])
        }
    }
}
