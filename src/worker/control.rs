//! Single-host worker process tracking for `control_workers`/`assets
//! shutdown-workers`, grounded on `original_source/control_workers.py`'s
//! `ControlWorkers`: that script enumerates live worker processes by
//! scanning `psutil.process_iter()` for a matching command line. Scanning
//! every process on the host needs a dependency this crate's stack has no
//! other use for (`sysinfo`/`psutil`-equivalent), so this keeps an
//! equivalent answer — "which worker processes are alive" — as a directory
//! of pidfiles written by `asset_worker` at startup and removed on clean
//! exit; liveness is checked with `kill -0`, not a process-table scan.

use std::path::{Path, PathBuf};

use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write this process's pidfile into `state_dir`, creating the directory
/// if needed. The file's name is the pid itself; its contents are unused.
pub async fn write_pidfile(state_dir: &Path, pid: u32) -> Result<(), ControlError> {
    fs::create_dir_all(state_dir).await?;
    fs::write(state_dir.join(pid.to_string()), b"").await?;
    Ok(())
}

pub async fn remove_pidfile(state_dir: &Path, pid: u32) -> Result<(), ControlError> {
    match fs::remove_file(state_dir.join(pid.to_string())).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Every pid tracked in `state_dir` that is still alive (tested with `kill
/// -0`), pruning stale pidfiles for processes that no longer exist.
pub async fn live_pids(state_dir: &Path) -> Result<Vec<u32>, ControlError> {
    let mut entries = match fs::read_dir(state_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut pids = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if is_alive(pid) {
            pids.push(pid);
        } else {
            let _ = remove_pidfile(state_dir, pid).await;
        }
    }
    Ok(pids)
}

/// `kill -0 <pid>` succeeds iff the process exists and is signalable by us.
pub fn is_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn send_signal(pid: u32, signal: &str) -> bool {
    std::process::Command::new("kill")
        .args([signal, &pid.to_string()])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Launch a sibling `asset_worker` binary (next to the current executable)
/// as a detached background process, returning its pid.
pub fn spawn_asset_worker(extra_args: &[String]) -> Result<u32, ControlError> {
    let exe = std::env::current_exe()?;
    let sibling = exe.with_file_name(if cfg!(windows) { "asset_worker.exe" } else { "asset_worker" });
    let child = std::process::Command::new(sibling).args(extra_args).spawn()?;
    Ok(child.id())
}

pub fn default_state_dir() -> PathBuf {
    PathBuf::from("./data/workers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pidfile_round_trips_through_live_pids() {
        let dir = tempfile::tempdir().unwrap();
        let pid = std::process::id();
        write_pidfile(dir.path(), pid).await.unwrap();
        assert_eq!(live_pids(dir.path()).await.unwrap(), vec![pid]);

        remove_pidfile(dir.path(), pid).await.unwrap();
        assert!(live_pids(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_pids_prunes_dead_entries() {
        let dir = tempfile::tempdir().unwrap();
        // A pid essentially guaranteed not to be alive.
        write_pidfile(dir.path(), 999_999).await.unwrap();
        let pids = live_pids(dir.path()).await.unwrap();
        assert!(!pids.contains(&999_999));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }
}
