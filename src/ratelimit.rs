//! Per-account rate limiting and API call logging.
//!
//! Grounded on `original_source/api/__init__.py`'s `pttl` → `incr` →
//! `multi_exec(incr, expire 1)` sequence: read the key's remaining TTL, and
//! either atomically increment (still within the current second) or reset
//! it to 1 with a fresh 1-second expiry. The same dumb-backend-behind-a-trait
//! shape as [`crate::storage`] and [`crate::queue`] keeps the atomic
//! primitive isolated from the request-handling policy built on top.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug)]
pub enum RateLimitError {
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend { message, .. } => write!(f, "rate limit backend error: {message}"),
        }
    }
}

impl std::error::Error for RateLimitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend { source: Some(s), .. } => Some(s.as_ref()),
            _ => None,
        }
    }
}

/// The single atomic primitive rate limiting needs: bump a per-second
/// counter, resetting it with a fresh 1-second expiry whenever the
/// previous window has lapsed. Returns `(count_after_increment,
/// remaining_ttl)` of the window the increment landed in.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn incr_with_1s_window(&self, key: &str) -> Result<(u64, Duration), RateLimitError>;
}

pub struct RedisRateLimitBackend {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisRateLimitBackend {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimitBackend {
    async fn incr_with_1s_window(&self, key: &str) -> Result<(u64, Duration), RateLimitError> {
        let mut conn = self.conn.clone();
        let map_err = |e: redis::RedisError| RateLimitError::Backend {
            message: e.to_string(),
            source: Some(Box::new(e)),
        };

        let ttl_ms: i64 = conn.pttl(key).await.map_err(map_err)?;
        if ttl_ms > 0 {
            conn.incr::<_, _, ()>(key, 1).await.map_err(map_err)?;
        } else {
            redis::pipe()
                .atomic()
                .incr(key, 1)
                .ignore()
                .expire(key, 1)
                .ignore()
                .query_async::<()>(&mut conn)
                .await
                .map_err(map_err)?;
        }

        let count: u64 = conn.get(key).await.map_err(map_err)?;
        let remaining_ttl = conn.pttl::<_, i64>(key).await.map_err(map_err)?.max(0);
        Ok((count, Duration::from_millis(remaining_ttl as u64)))
    }
}

/// In-process backend for tests and single-node deployments without Redis.
#[derive(Default)]
pub struct InMemoryRateLimitBackend {
    windows: Mutex<std::collections::HashMap<String, (u64, std::time::Instant)>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn incr_with_1s_window(&self, key: &str) -> Result<(u64, Duration), RateLimitError> {
        let mut windows = self.windows.lock();
        let now = std::time::Instant::now();
        let entry = windows.entry(key.to_string());
        let (count, expires_at) = match entry {
            std::collections::hash_map::Entry::Occupied(mut occupied) if occupied.get().1 > now => {
                occupied.get_mut().0 += 1;
                *occupied.get()
            }
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let expires_at = now + Duration::from_secs(1);
                *occupied.get_mut() = (1, expires_at);
                (1, expires_at)
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let expires_at = now + Duration::from_secs(1);
                vacant.insert((1, expires_at));
                (1, expires_at)
            }
        };
        Ok((count, expires_at.saturating_duration_since(now)))
    }
}

/// Response headers reported alongside every rate-limited request.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

pub struct RateLimiter<B: RateLimitBackend> {
    backend: B,
    default_limit_per_second: u32,
}

impl<B: RateLimitBackend> RateLimiter<B> {
    pub fn new(backend: B, default_limit_per_second: u32) -> Self {
        Self {
            backend,
            default_limit_per_second,
        }
    }

    /// Record one request for `account_id`. Returns the headers to attach
    /// to the response, and whether the request is over its limit (in which
    /// case the caller must fail with `request_limit_exceeded`).
    pub async fn record_request(
        &self,
        account_id: Uuid,
        account_limit_override: Option<u32>,
    ) -> Result<(RateLimitHeaders, bool), RateLimitError> {
        let key = format!("rate:{account_id}:requests_in_last_second");
        let (count, ttl) = self.backend.incr_with_1s_window(&key).await?;
        let limit = account_limit_override.unwrap_or(self.default_limit_per_second);
        let over_limit = count > limit as u64;
        let remaining = (limit as i64 - count as i64).max(0) as u32;
        let headers = RateLimitHeaders {
            limit,
            remaining,
            reset_secs: ttl.as_secs().max(1),
        };
        Ok((headers, over_limit))
    }
}

/// One outcome-class bucket of the per-account API log ring (`success`,
/// `error`, etc. — the class is the caller's to define).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLogEntry {
    pub timestamp_ms: i64,
    pub method: String,
    pub path: String,
    pub status: u16,
}

/// Bounded, in-process per-account log ring. A single daily maintenance
/// pass should call [`ApiLogRing::trim_older_than`] to enforce the
/// configured retention window independently of the per-push cap.
#[derive(Default)]
pub struct ApiLogRing {
    max_entries: usize,
    entries: Mutex<std::collections::HashMap<Uuid, VecDeque<ApiLogEntry>>>,
}

impl ApiLogRing {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn push(&self, account_id: Uuid, entry: ApiLogEntry) {
        let mut entries = self.entries.lock();
        let ring = entries.entry(account_id).or_default();
        ring.push_back(entry);
        while ring.len() > self.max_entries {
            ring.pop_front();
        }
    }

    pub fn entries_for(&self, account_id: Uuid) -> Vec<ApiLogEntry> {
        self.entries
            .lock()
            .get(&account_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop entries older than `retention` relative to `now_ms`. Intended to
    /// be invoked from a daily maintenance task.
    pub fn trim_older_than(&self, now_ms: i64, retention: Duration) {
        let cutoff = now_ms - retention.as_millis() as i64;
        let mut entries = self.entries.lock();
        for ring in entries.values_mut() {
            ring.retain(|entry| entry.timestamp_ms >= cutoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_in_window_gets_full_remaining() {
        let limiter = RateLimiter::new(InMemoryRateLimitBackend::new(), 10);
        let (headers, over_limit) = limiter.record_request(Uuid::new_v4(), None).await.unwrap();
        assert_eq!(headers.limit, 10);
        assert_eq!(headers.remaining, 9);
        assert!(!over_limit);
    }

    #[tokio::test]
    async fn requests_beyond_limit_are_flagged() {
        let limiter = RateLimiter::new(InMemoryRateLimitBackend::new(), 2);
        let account_id = Uuid::new_v4();
        limiter.record_request(account_id, None).await.unwrap();
        limiter.record_request(account_id, None).await.unwrap();
        let (headers, over_limit) = limiter.record_request(account_id, None).await.unwrap();
        assert_eq!(headers.remaining, 0);
        assert!(over_limit);
    }

    #[tokio::test]
    async fn per_account_override_replaces_default_limit() {
        let limiter = RateLimiter::new(InMemoryRateLimitBackend::new(), 100);
        let (headers, over_limit) = limiter
            .record_request(Uuid::new_v4(), Some(1))
            .await
            .unwrap();
        assert_eq!(headers.limit, 1);
        assert!(!over_limit);
    }

    #[test]
    fn log_ring_trims_to_max_entries() {
        let ring = ApiLogRing::new(2);
        let account_id = Uuid::new_v4();
        for i in 0..5 {
            ring.push(
                account_id,
                ApiLogEntry {
                    timestamp_ms: i,
                    method: "GET".to_string(),
                    path: "/assets".to_string(),
                    status: 200,
                },
            );
        }
        let entries = ring.entries_for(account_id);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp_ms, 3);
        assert_eq!(entries[1].timestamp_ms, 4);
    }

    #[test]
    fn log_ring_trim_older_than_drops_stale_entries() {
        let ring = ApiLogRing::new(10);
        let account_id = Uuid::new_v4();
        ring.push(
            account_id,
            ApiLogEntry {
                timestamp_ms: 1_000,
                method: "GET".to_string(),
                path: "/assets".to_string(),
                status: 200,
            },
        );
        ring.push(
            account_id,
            ApiLogEntry {
                timestamp_ms: 100_000,
                method: "GET".to_string(),
                path: "/assets".to_string(),
                status: 200,
            },
        );
        ring.trim_older_than(100_500, Duration::from_millis(1_000));
        let entries = ring.entries_for(account_id);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp_ms, 100_000);
    }
}
