//! `assets {purge|clear-tasks|monitor-tasks|shutdown-workers}`, grounded on
//! `original_source/blueprints/assets/manage/commands.py`.

use chrono::Utc;
use clap::{Parser, Subcommand};
use h51::bootstrap::Shared;
use h51::config::Config;
use h51::domain::{stats::StatName, Task};
use h51::storage::build_backend;
use h51::worker::control;

#[derive(Parser)]
#[command(name = "assets")]
#[command(about = "Maintenance commands run out of the same process image as the API server")]
struct Cli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Delete assets whose expiry has passed, removing blobs before rows.
    Purge,
    /// Clear tasks from the queue; by default only unassigned ones.
    ClearTasks {
        #[arg(short, long)]
        force: bool,
    },
    /// Warn (via tracing) on high task volume, stuck tasks, or no workers.
    MonitorTasks,
    /// Signal every tracked asset_worker process to shut down.
    ShutdownWorkers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    h51::telemetry::init();
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.action {
        Action::Purge => purge(config).await?,
        Action::ClearTasks { force } => clear_tasks(config, force).await?,
        Action::MonitorTasks => monitor_tasks(config).await?,
        Action::ShutdownWorkers => shutdown_workers(&config).await?,
    }
    Ok(())
}

/// Delete every expired asset still bounded within a 48-hour grace window
/// (matching the original's `max_delete_period`, a guard against purging a
/// flood of very-old rows in one pass after an outage).
async fn purge(config: Config) -> anyhow::Result<()> {
    const MAX_DELETE_PERIOD: chrono::Duration = chrono::Duration::hours(48);

    let shared = Shared::connect(config).await?;
    let now = Utc::now();
    let assets = shared.asset_repo.list_all().await?;

    let mut purged = 0usize;
    for asset in assets {
        let Some(expires) = asset.expires else { continue };
        if expires > now || expires <= now - MAX_DELETE_PERIOD {
            continue;
        }

        let account = match shared.account_repo.by_id(asset.account_id).await {
            Ok(account) => account,
            Err(error) => {
                tracing::warn!(asset_id = %asset.id, %error, "purge: account lookup failed, skipping");
                continue;
            }
        };
        let Some(backend_settings) = account.backend_for(asset.secure) else {
            tracing::warn!(asset_id = %asset.id, "purge: no backend configured, skipping");
            continue;
        };
        let backend = build_backend(backend_settings);

        let mut length = blob_len(backend.as_ref(), &asset.store_key()).await;
        let _ = backend.delete(&asset.store_key()).await;

        let variation_count = asset.variations.len() as i64;
        for (variation_name, variation) in &asset.variations {
            let key = variation.store_key(&asset.name, &asset.uid, variation_name);
            length += blob_len(backend.as_ref(), &key).await;
            let _ = backend.delete(&key).await;
        }

        shared.asset_repo.delete(asset.id).await?;

        h51::accounts::record(shared.stats.as_ref(), asset.account_id, StatName::Assets, -1, now).await;
        h51::accounts::record(
            shared.stats.as_ref(),
            asset.account_id,
            StatName::Variations,
            -variation_count,
            now,
        )
        .await;
        h51::accounts::record(shared.stats.as_ref(), asset.account_id, StatName::Length, -length, now).await;
        purged += 1;
    }

    println!("purged {purged} expired asset(s)");
    Ok(())
}

async fn blob_len(backend: &dyn h51::storage::BlobBackend, key: &str) -> i64 {
    backend.retrieve(key).await.map(|bytes| bytes.len() as i64).unwrap_or(0)
}

async fn clear_tasks(config: Config, force: bool) -> anyhow::Result<()> {
    let shared = Shared::connect(config).await?;
    let mut cleared = 0usize;
    for task_id in shared.queue.list_task_ids().await? {
        let assigned = shared.queue.is_locked(&task_id).await.unwrap_or(false);
        if force || !assigned {
            shared.queue.delete(&task_id).await?;
            cleared += 1;
        }
    }
    println!("cleared {cleared} task(s)");
    Ok(())
}

/// Mirrors the original's three checks: overall volume, the age of the
/// oldest pending task, and whether any worker is around to drain them.
async fn monitor_tasks(config: Config) -> anyhow::Result<()> {
    let shared = Shared::connect(config).await?;
    let state_dir = shared.config.worker_state_dir.clone();
    let task_ids = shared.queue.list_task_ids().await?;

    if task_ids.len() > shared.config.warnings_max_tasks {
        tracing::warn!(count = task_ids.len(), "high volume of pending tasks");
        return Ok(());
    }

    let max_age = chrono::Duration::from_std(shared.config.warnings_max_task_age)
        .unwrap_or(chrono::Duration::max_value());
    let now = Utc::now();
    for task_id in &task_ids {
        let Ok(task) = shared.queue.peek::<Task>(task_id).await else { continue };
        let age = now.signed_duration_since(task.timestamp);
        if age > max_age {
            tracing::warn!(%task_id, age_secs = age.num_seconds(), "long running task");
            return Ok(());
        }
    }

    if !task_ids.is_empty() && control::live_pids(&state_dir).await?.is_empty() {
        tracing::warn!("no workers running to process pending tasks");
    }
    Ok(())
}

async fn shutdown_workers(config: &Config) -> anyhow::Result<()> {
    let pids = control::live_pids(&config.worker_state_dir).await?;
    for pid in &pids {
        control::send_signal(*pid, "-TERM");
    }
    println!("signaled {} worker(s)", pids.len());
    Ok(())
}
