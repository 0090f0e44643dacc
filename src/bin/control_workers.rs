//! `control_workers {spawn|stop|status|respawn}`, grounded on
//! `original_source/control_workers.py`'s `ControlWorkers`: spawn refuses
//! to start a second worker while one is already tracked, stop signals
//! every tracked pid and waits up to `--kill-delay` seconds before giving
//! up, status reports the live count with a process exit code a cron/init
//! script can branch on.

use std::time::Duration;

use clap::{Parser, Subcommand};
use h51::config::Config;
use h51::worker::control;

#[derive(Parser)]
#[command(name = "control_workers")]
#[command(about = "Spawn, stop, and monitor asset_worker processes on this host")]
struct Cli {
    #[command(subcommand)]
    action: Action,

    /// Deployment label passed through to a spawned `asset_worker --env`.
    #[arg(long, default_value = "production", global = true)]
    env: String,

    /// Seconds to wait for workers to exit after signaling before forcing
    /// a SIGKILL.
    #[arg(long, default_value_t = 10, global = true)]
    kill_delay: u64,
}

#[derive(Subcommand)]
enum Action {
    /// Start a worker if none are currently tracked.
    Spawn,
    /// Signal every tracked worker to shut down.
    Stop,
    /// Print the number of live workers; exits 0 if any, 1 otherwise.
    Status,
    /// Stop, then spawn.
    Respawn,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    h51::telemetry::init();
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.action {
        Action::Spawn => spawn(&config, &cli.env).await?,
        Action::Stop => stop(&config, cli.kill_delay).await?,
        Action::Status => status(&config).await?,
        Action::Respawn => {
            stop(&config, cli.kill_delay).await?;
            spawn(&config, &cli.env).await?;
        }
    }
    Ok(())
}

async fn spawn(config: &Config, env: &str) -> anyhow::Result<()> {
    let pids = control::live_pids(&config.worker_state_dir).await?;
    if !pids.is_empty() {
        anyhow::bail!(
            "not spawning new worker because running worker process(es) found: {pids:?}"
        );
    }
    let pid = control::spawn_asset_worker(&["--env".to_string(), env.to_string()])?;
    println!("spawned asset_worker pid {pid}");
    Ok(())
}

async fn stop(config: &Config, kill_delay: u64) -> anyhow::Result<()> {
    let pids = control::live_pids(&config.worker_state_dir).await?;
    for pid in &pids {
        control::send_signal(*pid, "-TERM");
    }

    let mut remaining = kill_delay;
    loop {
        let still_alive = control::live_pids(&config.worker_state_dir).await?;
        if still_alive.is_empty() || remaining == 0 {
            if !still_alive.is_empty() {
                for pid in &still_alive {
                    println!("forcibly killing {pid}");
                    control::send_signal(*pid, "-KILL");
                }
            }
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        remaining -= 1;
    }
    Ok(())
}

async fn status(config: &Config) -> anyhow::Result<()> {
    let pids = control::live_pids(&config.worker_state_dir).await?;
    println!("{} workers running", pids.len());
    if pids.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
