//! In-memory queue backend, used by tests and single-process deployments.
//!
//! Grounded on the `DashMap`-backed `InMemoryBackend` shape in the teacher
//! crate's `store::memory`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{QueueBackend, QueueError};

struct Entry {
    data: Vec<u8>,
    created_at_ms: i64,
    lock: Option<(String, Instant)>,
}

#[derive(Default)]
pub struct InMemoryQueueBackend {
    tasks: DashMap<String, Entry>,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn submit(&self, task_id: &str, data: &[u8], created_at_ms: i64) -> Result<(), QueueError> {
        self.tasks.insert(
            task_id.to_string(),
            Entry {
                data: data.to_vec(),
                created_at_ms,
                lock: None,
            },
        );
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Vec<u8>, QueueError> {
        self.tasks
            .get(task_id)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| QueueError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    async fn delete(&self, task_id: &str) -> Result<(), QueueError> {
        self.tasks.remove(task_id);
        Ok(())
    }

    async fn list_task_ids(&self) -> Result<Vec<String>, QueueError> {
        let mut entries: Vec<(String, i64)> = self
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), entry.created_at_ms))
            .collect();
        entries.sort_by_key(|(_, created_at_ms)| *created_at_ms);
        Ok(entries.into_iter().map(|(id, _)| id).collect())
    }

    async fn try_claim(
        &self,
        task_id: &str,
        worker_id: &str,
        lock_ttl_secs: u64,
    ) -> Result<bool, QueueError> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| QueueError::NotFound {
                task_id: task_id.to_string(),
            })?;
        let now = Instant::now();
        let lock_is_live = matches!(&entry.lock, Some((_, expiry)) if *expiry > now);
        if lock_is_live {
            return Ok(false);
        }
        entry.lock = Some((worker_id.to_string(), now + Duration::from_secs(lock_ttl_secs)));
        Ok(true)
    }

    async fn refresh_lock(
        &self,
        task_id: &str,
        worker_id: &str,
        lock_ttl_secs: u64,
    ) -> Result<bool, QueueError> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| QueueError::NotFound {
                task_id: task_id.to_string(),
            })?;
        match &entry.lock {
            Some((owner, expiry)) if owner == worker_id && *expiry > Instant::now() => {
                entry.lock = Some((
                    worker_id.to_string(),
                    Instant::now() + Duration::from_secs(lock_ttl_secs),
                ));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_locked(&self, task_id: &str) -> Result<bool, QueueError> {
        Ok(self
            .tasks
            .get(task_id)
            .map(|entry| matches!(&entry.lock, Some((_, expiry)) if *expiry > Instant::now()))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_claimant_observes_failure() {
        let backend = InMemoryQueueBackend::new();
        backend.submit("t1", b"data", 0).await.unwrap();
        assert!(backend.try_claim("t1", "worker-a", 30).await.unwrap());
        assert!(!backend.try_claim("t1", "worker-b", 30).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_lock_fails_for_non_owner() {
        let backend = InMemoryQueueBackend::new();
        backend.submit("t1", b"data", 0).await.unwrap();
        backend.try_claim("t1", "worker-a", 30).await.unwrap();
        assert!(!backend.refresh_lock("t1", "worker-b", 30).await.unwrap());
        assert!(backend.refresh_lock("t1", "worker-a", 30).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = InMemoryQueueBackend::new();
        backend.delete("never-existed").await.unwrap();
    }
}
