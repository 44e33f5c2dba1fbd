//! Zendesk bridge binary.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use zendesk_bridge::{BridgeConfig, run_with_shutdown};

/// Zendesk slash command bridge
#[derive(Parser)]
#[command(name = "zendesk-bridge")]
#[command(about = "Slash commands and OAuth linking for Zendesk")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "BRIDGE_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    let mut config = match &args.config {
        Some(path) => match BridgeConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config from {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => BridgeConfig::from_env(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Zendesk: {}", config.zendesk.url);
    info!("Public URL: {}", config.public_base());
    info!("Press Ctrl+C to stop");

    let shutdown_timeout = config.shutdown_timeout;
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();

    let shutdown = async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, shutting down (timeout: {}s)...", shutdown_timeout);
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down (timeout: {}s)...", shutdown_timeout);
            }
        }
        let _ = signalled_tx.send(());
    };

    // Bound the drain once a signal has arrived.
    let deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let server = run_with_shutdown(config, shutdown);
    let result = tokio::select! {
        result = server => result,
        _ = deadline => {
            error!("In-flight requests did not finish within {}s", shutdown_timeout);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}
