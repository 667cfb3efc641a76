use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use warren_executor::config::ExecutorConfig;
use warren_executor::engine::{ContainerEngine, ContainerEngineApi};
use warren_executor::handlers::ExecutorService;
use warren_executor::pool::ContainerPool;
use warren_protocol::{MessageBus, NatsBus};

#[derive(Debug, Parser)]
#[command(author, version, about = "Warren sandbox executor")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "WARREN_EXECUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = &cli.log_level;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warren_executor={level},warren_protocol={level},warn"
        ))
    });

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let cfg = ExecutorConfig::load(cli.config.as_deref())?;

    let engine: Arc<dyn ContainerEngineApi> = match cfg.engine {
        Some(engine_type) => Arc::new(ContainerEngine::with_type(engine_type)),
        None => Arc::new(ContainerEngine::new()),
    };

    let pool = Arc::new(ContainerPool::new(engine, cfg.pool_config()));
    let bus: Arc<dyn MessageBus> = Arc::new(NatsBus::connect(&cfg.nats_url).await?);
    let service = Arc::new(ExecutorService::new(pool.clone(), bus));

    let housekeeping = pool
        .clone()
        .start_housekeeping(Duration::from_secs(cfg.housekeeping_interval_seconds));
    let acquire_loop = tokio::spawn(service.clone().run_acquire_loop());
    let cleanup_loop = tokio::spawn(service.run_cleanup_loop());

    info!(nats_url = %cfg.nats_url, image = %cfg.image, "executor ready");

    tokio::signal::ctrl_c().await?;
    info!("shutting down, draining container pool");

    acquire_loop.abort();
    cleanup_loop.abort();
    housekeeping.abort();
    pool.drain().await;

    Ok(())
}
