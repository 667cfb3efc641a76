use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use warren_coordinator::config::CoordinatorConfig;
use warren_coordinator::db::Database;
use warren_coordinator::handlers::ResponseListener;
use warren_coordinator::project::SqliteProjectDirectory;
use warren_coordinator::session::{SessionOrchestrator, SessionRepository};
use warren_protocol::{MessageBus, NatsBus};

#[derive(Debug, Parser)]
#[command(author, version, about = "Warren session coordinator")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "WARREN_COORDINATOR_CONFIG")]
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
            "warren_coordinator={level},warren_protocol={level},warn"
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

    let cfg = CoordinatorConfig::load(cli.config.as_deref())?;

    let db = Database::new(&cfg.database_path).await?;
    let sessions = SessionRepository::new(db.pool().clone());
    let projects = Arc::new(SqliteProjectDirectory::new(db.pool().clone()));
    let bus: Arc<dyn MessageBus> = Arc::new(NatsBus::connect(&cfg.nats_url).await?);

    let orchestrator = Arc::new(SessionOrchestrator::new(sessions, projects, bus.clone()));
    let listener = Arc::new(ResponseListener::new(orchestrator.clone(), bus));

    let success_loop = tokio::spawn(listener.clone().run_success_loop());
    let failure_loop = tokio::spawn(listener.run_failure_loop());
    let reaper = orchestrator.start_idle_reaper(
        cfg.idle_timeout_minutes,
        Duration::from_secs(cfg.reap_interval_seconds),
    );

    info!(
        nats_url = %cfg.nats_url,
        database = %cfg.database_path.display(),
        "coordinator ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    success_loop.abort();
    failure_loop.abort();
    reaper.abort();

    Ok(())
}
