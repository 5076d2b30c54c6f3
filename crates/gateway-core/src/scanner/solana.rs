use std::{net::SocketAddr, sync::Arc, time::Duration};

use ahash::{AHashMap, AHashSet};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::{
    config::ScannerConfig,
    metrics::MetricsCollector,
    storage::{NewPeer, Peer, PeerRepository, PeerStatus},
    upstream::HttpClient,
};

use super::{
    client::RpcClient,
    probes::{ProbeSettings, Prober},
    whois::{IpApiResolver, IpInfoResolver, NoopResolver, WhoisError},
    ChainAdapter, DiscoveryReport, ScanError, ScanReport, ScanState,
};

/// Gossip sources queried at once during discovery.
const DISCOVERY_CONCURRENCY: usize = 16;

/// A peer as listed by `getClusterNodes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipPeer {
    pub address: String,
    pub port: u16,
    pub version: Option<String>,
    pub node_pubkey: Option<String>,
}

/// Expands one `getClusterNodes` entry into the addresses worth scanning.
///
/// The gossip IP gets the advertised RPC port when both share an IP, otherwise the
/// default port. A distinct RPC IP is listed as a peer of its own.
#[must_use]
pub fn gossip_peers(node: &Value, default_rpc_port: u16) -> Vec<GossipPeer> {
    let parse = |field: &str| node[field].as_str().and_then(|s| s.parse::<SocketAddr>().ok());
    let Some(gossip) = parse("gossip") else {
        return Vec::new();
    };
    let rpc = parse("rpc");
    let version = node["version"].as_str().map(str::to_string);
    let node_pubkey = node["pubkey"].as_str().map(str::to_string);

    let peer = |addr: SocketAddr, port: u16| GossipPeer {
        address: addr.ip().to_string(),
        port,
        version: version.clone(),
        node_pubkey: node_pubkey.clone(),
    };

    match rpc {
        Some(rpc) if rpc.ip() == gossip.ip() => vec![peer(gossip, rpc.port())],
        Some(rpc) => vec![peer(gossip, default_rpc_port), peer(rpc, rpc.port())],
        None => vec![peer(gossip, default_rpc_port)],
    }
}

/// Solana scanning: `getVersion`/`getGenesisHash` identity checks, per-method
/// probes, `getClusterNodes` discovery, and `getVoteAccounts` validator membership.
pub struct SolanaAdapter {
    repository: Arc<dyn PeerRepository>,
    prober: Prober,
    resolver: Arc<dyn IpInfoResolver>,
    metrics: Arc<MetricsCollector>,
    blockchain: String,
    bootstrap_rpc_url: String,
    default_rpc_port: u16,
    validators: ArcSwap<AHashSet<String>>,
}

impl SolanaAdapter {
    #[must_use]
    pub fn new(
        repository: Arc<dyn PeerRepository>,
        prober: Prober,
        resolver: Arc<dyn IpInfoResolver>,
        metrics: Arc<MetricsCollector>,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            repository,
            prober,
            resolver,
            metrics,
            blockchain: config.blockchain.clone(),
            bootstrap_rpc_url: config.bootstrap_rpc_url.clone(),
            default_rpc_port: config.default_rpc_port,
            validators: ArcSwap::from_pointee(AHashSet::new()),
        }
    }

    /// Builds the adapter with the resolver selected by `config.whois`.
    ///
    /// # Errors
    ///
    /// Returns an error if the whois HTTP client cannot be built.
    pub fn from_config(
        repository: Arc<dyn PeerRepository>,
        http_client: Arc<HttpClient>,
        metrics: Arc<MetricsCollector>,
        config: &ScannerConfig,
    ) -> Result<Self, WhoisError> {
        let client = RpcClient::new(http_client, config.probe_timeout());
        let prober = Prober::new(client, ProbeSettings::from(config), Arc::clone(&metrics));
        let resolver: Arc<dyn IpInfoResolver> = if config.whois.enabled {
            Arc::new(IpApiResolver::new(&config.whois.base_url, Duration::from_secs(10))?)
        } else {
            Arc::new(NoopResolver)
        };
        Ok(Self::new(repository, prober, resolver, metrics, config))
    }

    #[must_use]
    pub fn validator_count(&self) -> usize {
        self.validators.load().len()
    }

    fn is_validator(&self, peer: &Peer) -> bool {
        peer.node_pubkey.as_ref().is_some_and(|key| self.validators.load().contains(key))
    }

    /// Fetches the voting validator identities from the bootstrap node.
    ///
    /// # Errors
    ///
    /// Returns the RPC failure or [`ScanError::InvalidResponse`] for a malformed answer.
    pub async fn load_validators(&self) -> Result<usize, ScanError> {
        let call = self.prober.client().call(&self.bootstrap_rpc_url, "getVoteAccounts", None).await;
        let result = call.result?;
        let current = result["current"]
            .as_array()
            .ok_or_else(|| ScanError::InvalidResponse("missing current vote accounts".to_string()))?;

        let validators: AHashSet<String> = current
            .iter()
            .filter_map(|account| account["nodePubkey"].as_str().map(str::to_string))
            .collect();
        let count = validators.len();
        self.validators.store(Arc::new(validators));
        Ok(count)
    }

    /// Persists one scan report.
    async fn apply_report(&self, peer: &Peer, report: &ScanReport) -> Result<(), ScanError> {
        let is_validator = self.is_validator(peer);
        let status = match report.state {
            ScanState::Unreachable => {
                self.repository.delete_peer_methods(peer.id).await?;
                PeerStatus {
                    is_alive: false,
                    is_mainnet: None,
                    is_rpc: false,
                    is_validator,
                    version: None,
                }
            }
            ScanState::WrongNetwork => {
                self.repository.delete_peer_methods(peer.id).await?;
                PeerStatus {
                    is_alive: true,
                    is_mainnet: Some(false),
                    is_rpc: false,
                    is_validator,
                    version: report.version.clone(),
                }
            }
            ScanState::Probed => {
                for probe in &report.methods {
                    let outcome = if probe.valid {
                        let ms = i64::try_from(probe.latency.as_millis()).unwrap_or(i64::MAX);
                        self.repository.upsert_peer_method(peer.id, probe.method, ms).await
                    } else {
                        self.repository.delete_peer_method(peer.id, probe.method).await
                    };
                    if let Err(e) = outcome {
                        tracing::error!(
                            peer = %peer.address,
                            method = probe.method,
                            error = %e,
                            "failed to store probe result"
                        );
                    }
                }
                PeerStatus {
                    is_alive: true,
                    is_mainnet: Some(true),
                    is_rpc: true,
                    is_validator,
                    version: report.version.clone(),
                }
            }
        };

        self.repository.update_peer_status(peer.id, &status).await?;
        Ok(())
    }

    async fn fetch_cluster_nodes(&self, url: String) -> Result<Vec<Value>, ScanError> {
        let result = self.prober.client().call(&url, "getClusterNodes", None).await.result?;
        match result {
            Value::Array(nodes) => Ok(nodes),
            _ => Err(ScanError::InvalidResponse("getClusterNodes result is not an array".to_string())),
        }
    }

    /// Collects gossip from every alive mainnet peer, or the bootstrap node when
    /// none is known yet. Keyed by IP; the first listing of an IP wins.
    async fn collect_gossip(&self) -> Result<AHashMap<String, GossipPeer>, ScanError> {
        let mut sources: Vec<String> = self
            .repository
            .list_alive_mainnet_peers(&self.blockchain)
            .await?
            .iter()
            .filter(|peer| !peer.is_outdated)
            .map(Peer::rpc_url)
            .collect();
        if sources.is_empty() {
            sources.push(self.bootstrap_rpc_url.clone());
        }

        let listings: Vec<(String, Result<Vec<Value>, ScanError>)> = stream::iter(sources)
            .map(|url| async move {
                let nodes = self.fetch_cluster_nodes(url.clone()).await;
                (url, nodes)
            })
            .buffer_unordered(DISCOVERY_CONCURRENCY)
            .collect()
            .await;

        let mut gossip = AHashMap::new();
        for (url, listing) in listings {
            match listing {
                Ok(nodes) => {
                    for node in &nodes {
                        for peer in gossip_peers(node, self.default_rpc_port) {
                            gossip.entry(peer.address.clone()).or_insert(peer);
                        }
                    }
                }
                Err(e) => tracing::debug!(source = %url, error = %e, "gossip source failed"),
            }
        }

        if gossip.is_empty() {
            return Err(ScanError::NoGossip);
        }
        Ok(gossip)
    }

    async fn insert_new_peer(&self, gossip: &GossipPeer) -> Result<(), ScanError> {
        let ip_info = match self.resolver.lookup(&gossip.address).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(address = %gossip.address, error = %e, "ip enrichment skipped");
                None
            }
        };

        let id = self
            .repository
            .insert_peer(&NewPeer {
                blockchain: self.blockchain.clone(),
                address: gossip.address.clone(),
                port: gossip.port,
                version: gossip.version.clone(),
                node_pubkey: gossip.node_pubkey.clone(),
                is_ssl: false,
            })
            .await?;

        if let Some(info) = ip_info {
            self.repository.upsert_ip_info(id, &info).await?;
        }
        Ok(())
    }

    async fn refresh_known_peer(&self, known: &Peer, gossip: &GossipPeer) -> Result<bool, ScanError> {
        if known.is_outdated {
            self.repository.set_peer_outdated(known.id, false).await?;
        }

        let version_drift = gossip.version.is_some() && gossip.version != known.version;
        let key_drift = gossip.node_pubkey.is_some() && gossip.node_pubkey != known.node_pubkey;
        if !version_drift && !key_drift {
            return Ok(false);
        }

        self.repository
            .update_peer_identity(known.id, gossip.version.as_deref(), gossip.node_pubkey.as_deref())
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn blockchain(&self) -> &str {
        &self.blockchain
    }

    async fn prepare(&self) {
        match self.load_validators().await {
            Ok(count) => tracing::info!(validators = count, "validator set loaded"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load validator set, no peer will be marked validator");
            }
        }
    }

    async fn scan_peer(&self, peer: &Peer) -> Result<ScanReport, ScanError> {
        let url = peer.rpc_url();
        let report = self.prober.probe_url(&url).await;
        self.metrics.record_peer_scanned(report.state.as_str());

        tracing::debug!(
            peer = %url,
            state = report.state.as_str(),
            valid_methods = report.valid_methods().count(),
            "peer scanned"
        );

        self.apply_report(peer, &report).await?;
        Ok(report)
    }

    async fn discover(&self) -> Result<DiscoveryReport, ScanError> {
        let gossip = self.collect_gossip().await?;
        let known: AHashMap<String, Peer> = self
            .repository
            .list_peers(&self.blockchain)
            .await?
            .into_iter()
            .map(|peer| (peer.address.clone(), peer))
            .collect();

        let mut report = DiscoveryReport { seen: gossip.len(), ..DiscoveryReport::default() };

        for (address, entry) in &gossip {
            let outcome = match known.get(address) {
                Some(peer) => self.refresh_known_peer(peer, entry).await.map(|updated| {
                    if updated {
                        report.updated += 1;
                    }
                }),
                None => self.insert_new_peer(entry).await.map(|()| report.inserted += 1),
            };
            if let Err(e) = outcome {
                tracing::error!(address = %address, error = %e, "failed to store discovered peer");
            }
        }

        for peer in known.values().filter(|p| !p.is_outdated && !gossip.contains_key(&p.address)) {
            match self.repository.set_peer_outdated(peer.id, true).await {
                Ok(()) => report.outdated += 1,
                Err(e) => tracing::error!(address = %peer.address, error = %e, "failed to mark peer outdated"),
            }
        }

        self.metrics.record_discovered_peers(report.inserted as u64);
        tracing::info!(
            seen = report.seen,
            inserted = report.inserted,
            updated = report.updated,
            outdated = report.outdated,
            "discovery pass complete"
        );
        Ok(report)
    }
}
