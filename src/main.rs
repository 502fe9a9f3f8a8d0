use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ratewell::config::RatewellConfig;
use ratewell::http::{AppState, HttpServer};
use ratewell::ratelimit::{spawn_idle_sweeper, Counter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "ratewell", version, about = "Per-client leaky bucket rate limiting service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file and BIND_ADDR)
    #[arg(short, long)]
    bind: Option<String>,

    /// Calls per minute allowed per client address (0 disables limiting)
    #[arg(short, long)]
    limit: Option<i64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Ratewell Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    info!(
        bind_addr = %config.server.bind_addr,
        limit_per_minute = config.rate_limiting.limit_per_minute,
        "Configuration loaded"
    );

    let counter = Arc::new(Counter::new());
    info!("Rate limiter initialized");

    let sweeper = config.eviction.enabled().then(|| {
        spawn_idle_sweeper(
            Arc::clone(&counter),
            config.eviction.sweep_interval(),
            config.eviction.idle_timeout(),
        )
    });

    let state = AppState::new(counter, config.rate_limiting.limit_per_minute);
    let server = HttpServer::new(config.server.bind_addr, state);

    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Ratewell Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Layer the config sources: file and `RATEWELL__*` variables, then the
/// plain `BIND_ADDR` variable, then command line flags.
fn load_config(args: &Args) -> anyhow::Result<RatewellConfig> {
    let mut config = RatewellConfig::load(args.config.as_deref())?;

    if let Ok(addr) = std::env::var("BIND_ADDR") {
        if !addr.is_empty() {
            config = config.with_bind_addr(&addr)?;
        }
    }
    if let Some(ref addr) = args.bind {
        config = config.with_bind_addr(addr)?;
    }
    if let Some(limit) = args.limit {
        config.rate_limiting.limit_per_minute = limit;
    }

    config.validate()?;
    Ok(config)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
