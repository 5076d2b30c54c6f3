pub mod config;
pub mod peers;
pub mod scanner;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use peers::{handle_peer_command, PeerCommands};
