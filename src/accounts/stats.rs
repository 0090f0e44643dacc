//! The atomic counter sink `Stats::inc` needs: bump every key
//! [`crate::domain::stats::inc_keys`] computes for one event, behind the
//! same dumb-backend shape used for rate limiting and the queue. Counters
//! may go negative (e.g. `length` shrinking when a variation is replaced by
//! a smaller one) — that is expected, not a bug, per the redesign notes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::stats::{inc_keys, StatName};

#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn incr(&self, key: &str, delta: i64) -> i64;
}

/// Increment every key for one `(account, stat, delta)` event at time `at`.
pub async fn record<S: StatsSink + ?Sized>(
    sink: &S,
    account_id: Uuid,
    stat: StatName,
    delta: i64,
    at: DateTime<Utc>,
) {
    for key in inc_keys(&account_id.to_string(), stat, at) {
        sink.incr(&key, delta).await;
    }
}

#[derive(Default)]
pub struct InMemoryStatsSink {
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn get(&self, key: &str) -> i64 {
        *self.counters.lock().get(key).unwrap_or(&0)
    }
}

#[async_trait]
impl StatsSink for InMemoryStatsSink {
    async fn incr(&self, key: &str, delta: i64) -> i64 {
        let mut counters = self.counters.lock();
        let entry = counters.entry(key.to_string()).or_insert(0);
        *entry += delta;
        *entry
    }
}

pub struct RedisStatsSink {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisStatsSink {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl StatsSink for RedisStatsSink {
    async fn incr(&self, key: &str, delta: i64) -> i64 {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.incr(key, delta).await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_increments_all_eight_keys() {
        let sink = InMemoryStatsSink::new();
        let account_id = Uuid::new_v4();
        let at = Utc::now();
        record(&sink, account_id, StatName::Assets, 1, at).await;

        for key in inc_keys(&account_id.to_string(), StatName::Assets, at) {
            assert_eq!(sink.get(&key), 1, "key {key}");
        }
    }

    #[tokio::test]
    async fn negative_deltas_are_preserved() {
        let sink = InMemoryStatsSink::new();
        let account_id = Uuid::new_v4();
        let at = Utc::now();
        record(&sink, account_id, StatName::Length, 100, at).await;
        record(&sink, account_id, StatName::Length, -40, at).await;

        let key = &inc_keys(&account_id.to_string(), StatName::Length, at)[0];
        assert_eq!(sink.get(key), 60);
    }
}
