use clap::Subcommand;
use gateway_core::config::AppConfig;
use std::path::Path;

use super::utils::{print_error, print_info, print_success, CliError, CliResult};

const SAMPLE_CONFIG: &str = include_str!("../../../../config/config.toml");

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Print the effective configuration, environment overrides included
    Show {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Show the database URL
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Write a sample configuration file
    Generate {
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, show_sensitive } => show_config(&file, show_sensitive),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!("  Failover targets: {}", config.failover.len());
    println!("  Scanner: {} workers, chain {}", config.scanner.workers, config.scanner.blockchain);
    println!("  Stats: {}", if config.stats.enabled { "enabled" } else { "disabled" });
    println!("  Whois: {}", if config.scanner.whois.enabled { "enabled" } else { "disabled" });

    Ok(())
}

fn show_config(file: &str, show_sensitive: bool) -> CliResult<()> {
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;

    println!("Configuration from {file}:");

    println!("\n[Server]");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Bind Port: {}", config.server.bind_port);
    println!("  Max Concurrent Requests: {}", config.server.max_concurrent_requests);
    println!("  Request Timeout: {}s", config.server.request_timeout_seconds);

    println!("\n[Transport]");
    println!("  Max Attempts: {}", config.transport.max_attempts);
    println!("  Jail Unit: {}ms", config.transport.jail_unit_ms);
    println!("  Success Threshold: {}", config.transport.success_threshold);
    println!("  Rate Window: {}s", config.transport.rate_window_seconds);
    println!("  Unscanned Method Slack: {}", config.transport.unscanned_method_slack);

    println!("\n[Failover] ({} targets)", config.failover.len());
    for target in &config.failover {
        if target.hourly_quota == 0 {
            println!("  {} (unlimited)", target.url);
        } else {
            println!("  {} ({} req/h)", target.url, target.hourly_quota);
        }
    }

    println!("\n[Scanner]");
    println!("  Blockchain: {}", config.scanner.blockchain);
    println!("  Workers: {}", config.scanner.workers);
    println!("  Scan Interval: {}s", config.scanner.scan_interval_seconds);
    println!("  Discovery Interval: {}s", config.scanner.discovery_interval_seconds);
    println!("  Bootstrap RPC: {}", config.scanner.bootstrap_rpc_url);

    println!("\n[Storage]");
    if show_sensitive {
        println!("  Database URL: {}", config.storage.database_url);
    } else {
        println!("  Database URL: [hidden - use --show-sensitive to reveal]");
    }

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(output, SAMPLE_CONFIG)?;
    print_success(&format!("Sample configuration written to {output}"));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses_and_validates() {
        let config: AppConfig = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.failover.len(), 1);
        assert_eq!(config.scanner.blockchain, "solana");
    }

    #[test]
    fn test_generate_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        generate_config(path, false).unwrap();
        assert!(generate_config(path, false).is_err());
        generate_config(path, true).unwrap();
    }

    #[test]
    fn test_validate_missing_file() {
        assert!(matches!(validate_config("/nonexistent/gateway.toml"), Err(CliError::Config(_))));
    }
}
