//! Redis-backed `QueueBackend`, grounded on the Lua-script patterns in the
//! teacher crate's `store::redis::RedisBackend`: a task record plus index are
//! maintained together via `redis::Script`, and ownership is expressed as a
//! key holding the winning worker id with an expiry instead of a separate
//! lock table.
//!
//! # Key schema
//!
//! | Key | Type | Purpose |
//! |-----|------|---------|
//! | `{prefix}:task:{task_id}` | String | task payload bytes |
//! | `{prefix}:idx` | Sorted set | every known task id, scored by `created_at_ms` |
//! | `{prefix}:lock:{task_id}` | String | `worker_id`, with a TTL while claimed |

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use super::backend::{QueueBackend, QueueError};

/// Claim succeeds only if the lock key is absent: `SET key worker_id NX EX
/// ttl`. Returns 1 on success, 0 if another worker already holds it.
const LUA_TRY_CLAIM: &str = r#"
local ok = redis.call('SET', KEYS[1], ARGV[1], 'NX', 'EX', ARGV[2])
if ok then
    return 1
end
return 0
"#;

/// Extend the lock's TTL, but only while `worker_id` is still the holder.
const LUA_REFRESH_LOCK: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Remove a task's payload, index entry, and lock together.
const LUA_DELETE: &str = r#"
redis.call('DEL', KEYS[1])
redis.call('DEL', KEYS[2])
redis.call('ZREM', KEYS[3], ARGV[1])
return 1
"#;

#[derive(Debug, Clone)]
pub struct RedisQueueBackend {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisQueueBackend {
    pub async fn new(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(|e| QueueError::Backend {
            message: format!("failed to create Redis client: {e}"),
            source: Some(Box::new(e)),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Backend {
                message: format!("failed to connect to Redis: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            conn,
            key_prefix: "h51".to_string(),
        })
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            key_prefix: "h51".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn task_key(&self, task_id: &str) -> String {
        format!("{}:task:{}", self.key_prefix, task_id)
    }

    fn lock_key(&self, task_id: &str) -> String {
        format!("{}:lock:{}", self.key_prefix, task_id)
    }

    fn index_key(&self) -> String {
        format!("{}:idx", self.key_prefix)
    }
}

fn map_redis_error(err: redis::RedisError, task_id: &str) -> QueueError {
    QueueError::Backend {
        message: format!("Redis error for task {task_id}: {err}"),
        source: Some(Box::new(err)),
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn submit(&self, task_id: &str, data: &[u8], created_at_ms: i64) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.task_key(task_id), data)
            .await
            .map_err(|e| map_redis_error(e, task_id))?;
        conn.zadd::<_, _, _, ()>(self.index_key(), task_id, created_at_ms)
            .await
            .map_err(|e| map_redis_error(e, task_id))?;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Vec<u8>, QueueError> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn
            .get(self.task_key(task_id))
            .await
            .map_err(|e| map_redis_error(e, task_id))?;
        data.ok_or_else(|| QueueError::NotFound {
            task_id: task_id.to_string(),
        })
    }

    async fn delete(&self, task_id: &str) -> Result<(), QueueError> {
        let script = Script::new(LUA_DELETE);
        let _: i64 = script
            .key(self.task_key(task_id))
            .key(self.lock_key(task_id))
            .key(self.index_key())
            .arg(task_id)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, task_id))?;
        Ok(())
    }

    async fn list_task_ids(&self) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn.clone();
        conn.zrange(self.index_key(), 0, -1)
            .await
            .map_err(|e| map_redis_error(e, "<index>"))
    }

    async fn try_claim(
        &self,
        task_id: &str,
        worker_id: &str,
        lock_ttl_secs: u64,
    ) -> Result<bool, QueueError> {
        let script = Script::new(LUA_TRY_CLAIM);
        let result: i64 = script
            .key(self.lock_key(task_id))
            .arg(worker_id)
            .arg(lock_ttl_secs)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, task_id))?;
        Ok(result == 1)
    }

    async fn refresh_lock(
        &self,
        task_id: &str,
        worker_id: &str,
        lock_ttl_secs: u64,
    ) -> Result<bool, QueueError> {
        let script = Script::new(LUA_REFRESH_LOCK);
        let result: i64 = script
            .key(self.lock_key(task_id))
            .arg(worker_id)
            .arg(lock_ttl_secs)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, task_id))?;
        Ok(result == 1)
    }

    async fn is_locked(&self, task_id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(self.lock_key(task_id))
            .await
            .map_err(|e| map_redis_error(e, task_id))?;
        Ok(exists)
    }
}

#[cfg(all(test, feature = "redis-tests"))]
mod integration_tests {
    use super::*;

    async fn test_backend() -> RedisQueueBackend {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedisQueueBackend::new(&url)
            .await
            .expect("Redis connection failed -- is Redis running?")
            .with_prefix(format!("test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn redis_submit_then_get_round_trips() {
        let backend = test_backend().await;
        backend.submit("t1", b"payload", 0).await.unwrap();
        assert_eq!(backend.get("t1").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn redis_second_claimant_fails() {
        let backend = test_backend().await;
        backend.submit("t1", b"payload", 0).await.unwrap();
        assert!(backend.try_claim("t1", "worker-a", 30).await.unwrap());
        assert!(!backend.try_claim("t1", "worker-b", 30).await.unwrap());
    }

    #[tokio::test]
    async fn redis_delete_removes_lock_and_index() {
        let backend = test_backend().await;
        backend.submit("t1", b"payload", 0).await.unwrap();
        backend.try_claim("t1", "worker-a", 30).await.unwrap();
        backend.delete("t1").await.unwrap();
        assert!(!backend.is_locked("t1").await.unwrap());
        assert!(backend.get("t1").await.is_err());
        assert!(!backend.list_task_ids().await.unwrap().contains(&"t1".to_string()));
    }
}
