use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use marketguard::config::GuardConfig;
use marketguard::grpc::GrpcServer;
use marketguard::ratelimit::RateLimiter;

/// Attempt limiter for marketplace account operations.
#[derive(Debug, Parser)]
#[command(name = "marketguard", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "MARKETGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the gRPC listen address
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Marketguard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GuardConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.grpc_addr {
        config.server.grpc_addr = addr;
    }
    info!(
        grpc_addr = %config.server.grpc_addr,
        sweep_interval_secs = config.limiter.sweep_interval_secs,
        "Configuration loaded"
    );

    let policies = config.limiter.policy_table()?;
    info!(policies = policies.len(), "Rate limit policies loaded");

    let rate_limiter = Arc::new(RateLimiter::new());
    let sweeper = rate_limiter.start_sweeper(config.limiter.sweep_interval());

    let grpc_server = GrpcServer::new(config.server.grpc_addr, Arc::clone(&rate_limiter), policies);
    let served = grpc_server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.stop().await;
    served?;

    info!("Marketguard stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
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
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
