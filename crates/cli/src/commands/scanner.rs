//! Scanner commands: the long-running daemon plus one-shot discovery and probing.

use gateway_core::{
    config::AppConfig,
    metrics::MetricsCollector,
    scanner::{
        ChainAdapter, ProbeSettings, Prober, RpcClient, ScanState, Scanner, SolanaAdapter,
    },
    storage::{PeerRepository, SqliteRepository},
    types::SCANNED_METHODS,
    upstream::{HttpClient, HttpClientConfig},
};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};
use tracing::{debug, error, info};

use super::utils::{print_info, print_success, CliError, CliResult};

/// Shared plumbing for every scanner command.
struct ScannerServices {
    repository: Arc<dyn PeerRepository>,
    http_client: Arc<HttpClient>,
    metrics: Arc<MetricsCollector>,
}

impl ScannerServices {
    async fn open(config: &AppConfig) -> CliResult<Self> {
        config.validate().map_err(CliError::Config)?;

        let repository =
            SqliteRepository::new(&config.storage.database_url, config.storage.max_connections)
                .await?;
        repository.init_schema().await?;
        repository.seed_methods(&config.scanner.blockchain, SCANNED_METHODS).await?;

        Ok(Self {
            repository: Arc::new(repository),
            http_client: Arc::new(http_client(config)?),
            metrics: Arc::new(
                MetricsCollector::new().map_err(|e| CliError::General(e.to_string()))?,
            ),
        })
    }

    fn adapter(&self, config: &AppConfig) -> CliResult<SolanaAdapter> {
        SolanaAdapter::from_config(
            self.repository.clone(),
            self.http_client.clone(),
            self.metrics.clone(),
            &config.scanner,
        )
        .map_err(|e| CliError::General(e.to_string()))
    }
}

fn http_client(config: &AppConfig) -> CliResult<HttpClient> {
    HttpClient::with_config(HttpClientConfig {
        concurrent_limit: config.transport.concurrent_limit,
        ..Default::default()
    })
    .map_err(|e| CliError::General(e.to_string()))
}

/// Runs discovery and peer scans until SIGINT/SIGTERM.
pub async fn run_daemon(config: &AppConfig) -> CliResult<()> {
    let services = ScannerServices::open(config).await?;
    let adapter: Arc<dyn ChainAdapter> = Arc::new(services.adapter(config)?);

    info!(
        blockchain = %config.scanner.blockchain,
        workers = config.scanner.workers,
        scan_interval_secs = config.scanner.scan_interval_seconds,
        discovery_interval_secs = config.scanner.discovery_interval_seconds,
        "Starting peer scanner"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = Scanner::new(adapter, services.repository.clone(), &config.scanner)
        .start(shutdown_rx)
        .await;

    shutdown_signal().await;
    signal_shutdown(&shutdown_tx);
    handle.join().await;

    info!("Peer scanner stopped");
    Ok(())
}

/// One discovery pass, then exit.
pub async fn discover_once(config: &AppConfig) -> CliResult<()> {
    let services = ScannerServices::open(config).await?;
    let adapter = services.adapter(config)?;

    print_info("Loading validator set...");
    let validators = adapter.load_validators().await?;
    print_info(&format!("{validators} validators in the current set"));

    print_info(&format!("Collecting gossip from {}...", config.scanner.bootstrap_rpc_url));
    let report = adapter.discover().await?;

    print_success("Discovery complete");
    println!("  Seen: {}", report.seen);
    println!("  Inserted: {}", report.inserted);
    println!("  Updated: {}", report.updated);
    println!("  Marked outdated: {}", report.outdated);
    Ok(())
}

/// Probes one URL without touching storage.
pub async fn probe_url(config: &AppConfig, url: &str) -> CliResult<()> {
    let metrics = Arc::new(MetricsCollector::new().map_err(|e| CliError::General(e.to_string()))?);
    let client = RpcClient::new(Arc::new(http_client(config)?), config.scanner.probe_timeout());
    let prober = Prober::new(client, ProbeSettings::from(&config.scanner), metrics);

    print_info(&format!("Probing {url}..."));
    let report = prober.probe_url(url).await;

    println!("  State: {}", report.state.as_str());
    if let Some(version) = &report.version {
        println!("  Version: {version}");
    }
    if report.state != ScanState::Probed {
        return Ok(());
    }

    let valid = report.valid_methods().count();
    println!("  Methods: {valid}/{} valid", report.methods.len());
    for probe in &report.methods {
        println!(
            "    {:<36} {:<8} {:>6}ms",
            probe.method,
            if probe.valid { "ok" } else { "invalid" },
            probe.latency.as_millis()
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, waiting for in-flight scans");
}

/// Broadcasts shutdown to the scanner tasks. Returns whether anyone was listening.
fn signal_shutdown(shutdown_tx: &broadcast::Sender<()>) -> bool {
    match shutdown_tx.send(()) {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "Failed to send shutdown signal (no receivers)");
            false
        }
    }
}
