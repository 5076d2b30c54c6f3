use clap::Subcommand;
use gateway_core::{
    config::AppConfig,
    storage::{PeerCapabilities, PeerRepository, SqliteRepository},
};

use super::utils::{print_info, CliError, CliResult};

#[derive(Subcommand)]
pub enum PeerCommands {
    /// List known peers with their confirmed methods
    List {
        /// Only peers the proxy would route to
        #[arg(long)]
        routable: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one peer in detail
    Show { id: i64 },
}

pub async fn handle_peer_command(command: PeerCommands, config: &AppConfig) -> CliResult<()> {
    let repository =
        SqliteRepository::new(&config.storage.database_url, config.storage.max_connections)
            .await?;
    repository.init_schema().await?;

    match command {
        PeerCommands::List { routable, json } => {
            let mut peers = repository.peer_capabilities(&config.scanner.blockchain).await?;
            if routable {
                peers.retain(|entry| entry.peer.is_routable());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&peers)?);
            } else {
                print_table(&peers);
            }
            Ok(())
        }
        PeerCommands::Show { id } => {
            let peer = repository
                .get_peer(id)
                .await?
                .ok_or_else(|| CliError::General(format!("Peer {id} not found")))?;

            println!("{}", serde_json::to_string_pretty(&peer)?);
            match repository.get_ip_info(id).await? {
                Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
                None => print_info("No IP enrichment recorded"),
            }
            Ok(())
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "y"
    } else {
        "-"
    }
}

fn print_table(peers: &[PeerCapabilities]) {
    println!(
        "{:>6}  {:<28} {:<5} {:<7} {:<3} {:<9} {:<12} {:>7}",
        "ID", "ENDPOINT", "ALIVE", "MAINNET", "RPC", "VALIDATOR", "VERSION", "METHODS"
    );
    for entry in peers {
        let peer = &entry.peer;
        println!(
            "{:>6}  {:<28} {:<5} {:<7} {:<3} {:<9} {:<12} {:>7}",
            peer.id,
            format!("{}:{}", peer.address, peer.port),
            flag(peer.is_alive),
            flag(peer.is_mainnet),
            flag(peer.is_rpc),
            flag(peer.is_validator),
            peer.version.as_deref().unwrap_or("-"),
            entry.methods.len()
        );
    }
    println!("{} peers", peers.len());
}
