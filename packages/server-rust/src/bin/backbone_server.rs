//! Backbone server entry point: telemetry, managed services, HTTP transport.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use backbone_server::network::{NetworkConfig, NetworkModule};
use backbone_server::service::{
    BackgroundExecutor, Instrumentation, ServerConfig, ServiceContext, ServiceRegistry,
};
use backbone_server::telemetry::{init_tracing, install_prometheus, LogFormat};
use clap::Parser;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "backbone-server", version, about = "Use-case orchestration server")]
struct Cli {
    #[command(flatten)]
    server: ServerConfig,

    #[command(flatten)]
    network: NetworkConfig,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Address of the Prometheus scrape endpoint. Disabled when unset.
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;
    cli.server.validate()?;

    if let Some(addr) = cli.metrics_addr {
        install_prometheus(addr)?;
        info!(%addr, "prometheus exporter listening");
    }

    let config = Arc::new(cli.server);
    let executor = Arc::new(BackgroundExecutor::from_config(&config));

    let registry = ServiceRegistry::new();
    registry.register_shared(Arc::clone(&executor));
    registry
        .init_all(&ServiceContext {
            config: Arc::clone(&config),
        })
        .await?;

    let mut network = NetworkModule::new(
        cli.network,
        Arc::clone(&config),
        executor,
        Arc::new(Instrumentation::standard()),
    );
    network.start().await?;
    let drained = network.serve(Router::new(), shutdown_signal()).await?;
    if !drained {
        warn!("background work still pending after drain timeout, aborting workers");
    }

    registry.shutdown_all(!drained).await?;
    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
