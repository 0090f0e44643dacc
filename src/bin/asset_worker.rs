//! `asset_worker --env <env> --idle-lifespan <seconds>`: claims and runs
//! tasks until idle for `idle_lifespan` or signaled to stop. Registers its
//! pid under the configured worker state directory on startup so
//! `control_workers`/`assets shutdown-workers` can find and signal it.

use std::time::Duration;

use clap::Parser;
use h51::bootstrap::Shared;
use h51::config::Config;
use h51::worker::{control, Worker, WorkerConfig};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "asset_worker")]
#[command(about = "Claim and execute asset analyze/transform tasks")]
struct Cli {
    /// Deployment label, used only for the startup log line and pidfile
    /// bookkeeping — settings themselves come from the environment.
    #[arg(long, default_value = "production")]
    env: String,

    /// Override how long the worker idles with no claimable task before
    /// exiting voluntarily.
    #[arg(long)]
    idle_lifespan: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    h51::telemetry::init();
    let cli = Cli::parse();
    let config = Config::from_env();
    let state_dir = config.worker_state_dir.clone();

    let shared = Shared::connect(config).await?;
    let worker_config = WorkerConfig {
        idle_lifespan: cli
            .idle_lifespan
            .map(Duration::from_secs)
            .unwrap_or(shared.config.worker_idle_lifespan),
        max_status_interval: shared.config.worker_max_status_interval,
        ..Default::default()
    };

    let worker = Worker::new(
        shared.queue,
        shared.event_bus,
        shared.account_repo,
        shared.asset_repo,
        shared.stats,
        shared.analyzer_registry,
        shared.transform_registry,
        shared.notifier,
        worker_config,
    );

    let pid = std::process::id();
    control::write_pidfile(&state_dir, pid).await?;
    tracing::info!(env = %cli.env, worker_id = %worker.worker_id(), pid, "asset_worker starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        let _ = shutdown_tx.send(true);
    });

    let final_state = worker.run(shutdown_rx).await;
    tracing::info!(?final_state, "asset_worker exiting");
    control::remove_pidfile(&state_dir, pid).await?;
    Ok(())
}
