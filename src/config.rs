//! Runtime configuration, loaded from the environment.
//!
//! Follows the same shape as `StoreConfig`/`TaskSecurityConfig` in the
//! teacher crate: a plain struct with a sensible `Default`, builder-style
//! `with_*` setters for tests, and a `from_env()` constructor that reads
//! typed defaults from `std::env` rather than inventing a config-file
//! format.

use std::env;
use std::time::Duration;

/// Process-wide configuration shared by the API server, the worker binary,
/// and the CLI tools.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection string used by the task queue, rate limiter, and
    /// event-adjacent bookkeeping keys.
    pub redis_url: String,

    /// Default per-second request limit applied to accounts with no
    /// explicit `api_rate_limit_per_second` set.
    pub api_rate_limit_per_second: u32,

    /// Maximum number of entries retained per account per outcome class in
    /// the API log ring.
    pub api_max_log_entries: usize,

    /// How long API log entries are retained before a maintenance sweep
    /// trims them, regardless of the ring's entry-count cap.
    pub api_log_retention: Duration,

    /// Upper bound on the number of variations accepted in a single
    /// transform request (single or bulk).
    pub max_variations_per_request: usize,

    /// Safety cap on the pixel dimensions a focal-point-driven transform
    /// will operate on, to bound worst-case memory use.
    pub focal_point_max_dimensions: (u32, u32),

    /// Whether uploads are scanned by an external antivirus hook before
    /// being persisted. No scanner is wired up (see DESIGN.md); the flag
    /// exists so the call site is in the right place when one is added.
    pub antivirus_enabled: bool,

    /// How long an idle worker waits for a claimable task before exiting
    /// voluntarily.
    pub worker_idle_lifespan: Duration,

    /// Maximum interval between lock-heartbeat refreshes during task
    /// execution.
    pub worker_max_status_interval: Duration,

    /// Root directory for the local filesystem blob backend.
    pub local_storage_root: std::path::PathBuf,

    /// Bind address for the HTTP API server.
    pub bind_addr: String,

    /// Directory `control_workers`/`asset_worker` use to track live worker
    /// pids on this host (one file per pid, named after it).
    pub worker_state_dir: std::path::PathBuf,

    /// `monitor-tasks` logs a warning once pending tasks exceed this count.
    pub warnings_max_tasks: usize,

    /// `monitor-tasks` logs a warning once any pending task's age exceeds
    /// this many seconds.
    pub warnings_max_task_age: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            api_rate_limit_per_second: 10,
            api_max_log_entries: 1_000,
            api_log_retention: Duration::from_secs(30 * 24 * 60 * 60),
            max_variations_per_request: 20,
            focal_point_max_dimensions: (8_000, 8_000),
            antivirus_enabled: false,
            worker_idle_lifespan: Duration::from_secs(300),
            worker_max_status_interval: Duration::from_secs(10),
            local_storage_root: std::path::PathBuf::from("./data/blobs"),
            bind_addr: "0.0.0.0:8080".to_string(),
            worker_state_dir: std::path::PathBuf::from("./data/workers"),
            warnings_max_tasks: 1_000,
            warnings_max_task_age: Duration::from_secs(15 * 60),
        }
    }
}

impl Config {
    /// Build a `Config` from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env::var("H51_REDIS_URL").unwrap_or(defaults.redis_url),
            api_rate_limit_per_second: env_parsed(
                "H51_API_RATE_LIMIT_PER_SECOND",
                defaults.api_rate_limit_per_second,
            ),
            api_max_log_entries: env_parsed(
                "H51_API_MAX_LOG_ENTRIES",
                defaults.api_max_log_entries,
            ),
            api_log_retention: env_parsed_secs(
                "H51_API_LOG_RETENTION_SECONDS",
                defaults.api_log_retention,
            ),
            max_variations_per_request: env_parsed(
                "H51_MAX_VARIATIONS_PER_REQUEST",
                defaults.max_variations_per_request,
            ),
            focal_point_max_dimensions: defaults.focal_point_max_dimensions,
            antivirus_enabled: env::var("H51_ANTIVIRUS_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.antivirus_enabled),
            worker_idle_lifespan: env_parsed_secs(
                "H51_WORKER_IDLE_LIFESPAN_SECONDS",
                defaults.worker_idle_lifespan,
            ),
            worker_max_status_interval: env_parsed_secs(
                "H51_WORKER_MAX_STATUS_INTERVAL_SECONDS",
                defaults.worker_max_status_interval,
            ),
            local_storage_root: env::var("H51_LOCAL_STORAGE_ROOT")
                .map(std::path::PathBuf::from)
                .unwrap_or(defaults.local_storage_root),
            bind_addr: env::var("H51_BIND_ADDR").unwrap_or(defaults.bind_addr),
            worker_state_dir: env::var("H51_WORKER_STATE_DIR")
                .map(std::path::PathBuf::from)
                .unwrap_or(defaults.worker_state_dir),
            warnings_max_tasks: env_parsed("H51_WARNINGS_MAX_TASKS", defaults.warnings_max_tasks),
            warnings_max_task_age: env_parsed_secs(
                "H51_WARNINGS_MAX_TASK_AGE_SECONDS",
                defaults.warnings_max_task_age,
            ),
        }
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    pub fn with_local_storage_root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.local_storage_root = root.into();
        self
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_parsed_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.api_rate_limit_per_second, 10);
        assert_eq!(config.max_variations_per_request, 20);
    }
}
