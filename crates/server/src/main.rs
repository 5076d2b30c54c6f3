use anyhow::Result;
use axum::serve;
use gateway_core::{config::AppConfig, runtime::GatewayRuntime};
use rustls::crypto::{ring::default_provider, CryptoProvider};
use server::router::{self, AppState};
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long background tasks get to drain after the listener stops.
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG").as_deref() {
        Ok("debug") => EnvFilter::new("warn,gateway_core=debug,server=debug"),
        Ok("trace") => EnvFilter::new("warn,gateway_core=trace,server=trace"),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn,gateway_core=debug,server=debug")),
        Err(_) => EnvFilter::new(format!(
            "warn,gateway_core={level},server={level}",
            level = config.logging.level
        )),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| anyhow::anyhow!("Failed to install crypto provider: {e:?}"))?;

    let config = AppConfig::load()?;
    init_logging(&config);
    info!(
        bind = %config.server.bind_address,
        port = config.server.bind_port,
        failover_targets = config.failover.len(),
        "Starting gateway proxy"
    );

    let mut runtime = GatewayRuntime::builder().with_config(config.clone()).build().await?;

    let state = AppState::new(runtime.proxy_engine().clone(), config.request_timeout());
    let app = router::create_app(state, &config);

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "RPC server listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    if tokio::time::timeout(
        Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        runtime.shutdown(),
    )
    .await
    .is_err()
    {
        warn!(
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT_SECS,
            "Background tasks did not stop in time"
        );
    }

    info!("Server shutdown complete");
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

    info!("Shutdown signal received, draining connections");
}
