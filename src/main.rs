use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use turnstile::config::{LoggingConfig, ServiceConfig};
use turnstile::http::{Admission, HttpServer};
use turnstile::ratelimit::{MultiTierEvaluator, RateLimiter};

/// Admission control service for HTTP APIs.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Service configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admission rules file (YAML); overrides `limiter.rules_path`
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Address to bind; overrides `server.bind_addr`
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Validate configuration and rules, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(rules) = cli.rules {
        config.limiter.rules_path = Some(rules);
    }
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }

    init_tracing(&config.logging);

    info!("Starting Turnstile admission service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // An invalid policy must never reach traffic.
    let rules = config.load_rules()?;
    let registry = match rules.registry() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(code = e.code(), error = %e, "Refusing to start with invalid policy");
            return Err(e.into());
        }
    };
    let dangling = rules.dangling_routes().len();
    info!(
        policies = registry.len(),
        routes = rules.routes.len(),
        dangling,
        "Admission rules loaded"
    );

    if cli.check {
        info!("Configuration OK");
        return Ok(());
    }

    let limiter = Arc::new(RateLimiter::new().with_store_timeout(config.store_timeout()));
    info!(store = limiter.store_name(), "Rate limiter initialized");
    let sweeper = limiter.spawn_sweeper(config.sweep_interval());

    let admission = Admission::new(
        MultiTierEvaluator::new(registry, limiter),
        rules.route_resolver(),
    )
    .with_global_policies(config.limiter.global_policies.clone());

    let server = HttpServer::new(config.server.bind_addr, Arc::new(admission));
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.abort();
    info!("Turnstile admission service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init();
    }
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
