//! The `QueueBackend` trait: dumb atomic primitives the task queue domain
//! layer builds claim discipline on top of.
//!
//! Grounded on `StorageBackend` in the teacher crate — no domain logic
//! (shuffling, claim taxonomy, heartbeat scheduling) belongs here. A
//! backend only knows how to store bytes under an id, and how to run the
//! two atomic primitives claiming needs: compare-and-set the `assigned_to`
//! field, and extend a lock's TTL conditioned on current ownership.

use std::fmt;

use async_trait::async_trait;

#[derive(Debug)]
pub enum QueueError {
    NotFound { task_id: String },
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { task_id } => write!(f, "task not found: {task_id}"),
            Self::Backend { message, .. } => write!(f, "queue backend error: {message}"),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// Dumb, content-addressed task storage plus the two atomic primitives
/// claim discipline needs.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Store a new task record unconditionally under `task_id`.
    /// `created_at_ms` is used as the sort key for scanning.
    async fn submit(&self, task_id: &str, data: &[u8], created_at_ms: i64) -> Result<(), QueueError>;

    /// Fetch the raw bytes for a task.
    async fn get(&self, task_id: &str) -> Result<Vec<u8>, QueueError>;

    /// Delete a task record and its lock, if any. Idempotent.
    async fn delete(&self, task_id: &str) -> Result<(), QueueError>;

    /// List every known task id, oldest first. Used by workers to build a
    /// candidate set to shuffle and by monitoring tools.
    async fn list_task_ids(&self) -> Result<Vec<String>, QueueError>;

    /// Atomically claim `task_id` for `worker_id`: succeeds only if no
    /// other worker currently holds a live lock. On success, sets the lock
    /// with `lock_ttl_secs` and marks the task record's `assigned_to`.
    async fn try_claim(
        &self,
        task_id: &str,
        worker_id: &str,
        lock_ttl_secs: u64,
    ) -> Result<bool, QueueError>;

    /// Refresh the lock TTL for `task_id`, but only if `worker_id` still
    /// holds it. Returns `false` if the lock expired and was lost to
    /// another claimant (or no one) in the meantime.
    async fn refresh_lock(
        &self,
        task_id: &str,
        worker_id: &str,
        lock_ttl_secs: u64,
    ) -> Result<bool, QueueError>;

    /// Whether `task_id` currently has a live lock (claimed and not yet
    /// expired). Used by monitoring to distinguish pending from running
    /// tasks.
    async fn is_locked(&self, task_id: &str) -> Result<bool, QueueError>;
}
