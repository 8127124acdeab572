//! fanin node entry point.

use clap::Parser;
use eyre::{Result, WrapErr, eyre};
use fanin_core::{LocalTransport, Orchestrator, PlaceholderTransform, Session, Transport};
use fanin_node::{Config, sim};
use std::path::PathBuf;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fanin-node", about = "Trigger-driven panorama fusion node")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "FANIN_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(config_file = %cli.config.display(), "Loading configuration");

    // Load and validate configuration
    let config = Config::load(&cli.config)?;

    info!(
        realm = %config.realm,
        entity_id = %config.entity_id,
        camera = %config.sources.camera,
        point_cloud = %config.sources.point_cloud,
        query_timeout = ?config.transport.query_timeout,
        "Configuration loaded"
    );

    let session = Session::open(LocalTransport::new(config.transport.query_timeout));

    // The session is closed on every exit path.
    let result = run(&session, &config).await;
    if let Err(e) = &result {
        error!(error = %e, "fanin node failed");
    }
    session.close()?;

    info!("fanin node shutting down");
    result
}

async fn run<T: Transport>(session: &Session<T>, config: &Config) -> Result<()> {
    let shutdown = CancellationToken::new();

    let mut sim_tasks = match &config.sim {
        Some(sim) => sim::spawn(session, config, sim, &shutdown).await?,
        None => JoinSet::new(),
    };

    let orchestrator = Orchestrator::new(
        session,
        config.to_orchestrator_config()?,
        PlaceholderTransform,
    )?;

    info!("fanin node started, press Ctrl+C to stop");

    let serve = orchestrator.serve(shutdown.clone());
    tokio::pin!(serve);

    let served = tokio::select! {
        served = &mut serve => match served {
            Ok(()) if !shutdown.is_cancelled() => Err(eyre!("Orchestrator stopped unexpectedly")),
            served => served,
        },
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Ctrl-C received, stopping"),
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, stopping"),
            }
            shutdown.cancel();
            serve.await
        }
    };

    shutdown.cancel();
    while let Some(joined) = sim_tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Simulated source task failed");
        }
    }

    served.wrap_err("Serving failed")
}
