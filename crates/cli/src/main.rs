use clap::{Parser, Subcommand};
use gateway_core::config::AppConfig;
use rustls::crypto::{ring::default_provider, CryptoProvider};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
use commands::{
    handle_config_command, handle_peer_command, scanner, utils::CliError, ConfigCommands,
    PeerCommands,
};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Peer scanner and management tool for the Solana RPC gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $GATEWAY_CONFIG, then config/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the peer scanner until interrupted
    Scan,

    /// Run one gossip discovery pass
    Discover,

    /// Probe a single RPC URL and print which methods it serves
    Probe { url: String },

    /// Inspect scanned peers
    #[command(subcommand)]
    Peers(PeerCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn load_config(path: Option<&str>) -> Result<AppConfig, CliError> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .map_err(|e| CliError::Config(e.to_string()))
}

/// Loads the configuration and starts logging with it.
fn prepare(path: Option<&str>) -> Result<AppConfig, CliError> {
    let config = load_config(path)?;
    init_logging(&config);
    Ok(config)
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,gateway_core={level},gateway_cli={level}",
            level = config.logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| format!("Failed to install crypto provider: {e:?}"))?;

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config(config_command) => handle_config_command(config_command)?,
        Commands::Scan => scanner::run_daemon(&prepare(config_path)?).await?,
        Commands::Discover => scanner::discover_once(&prepare(config_path)?).await?,
        Commands::Probe { url } => scanner::probe_url(&prepare(config_path)?, &url).await?,
        Commands::Peers(peer_command) => {
            handle_peer_command(peer_command, &prepare(config_path)?).await?;
        }
    }

    Ok(())
}
