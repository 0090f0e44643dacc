//! Task queue domain layer: claim discipline, shuffled dequeue, and the
//! `claim_lost` / `malformed_task` / `execution_error` taxonomy sit here,
//! above the dumb [`QueueBackend`] primitives, mirroring how
//! `GenericTaskStore` layers state-machine logic over `StorageBackend` in
//! the teacher crate.

mod backend;
mod memory;
mod redis;

pub use backend::{QueueBackend, QueueError};
pub use memory::InMemoryQueueBackend;
pub use redis::RedisQueueBackend;

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::Task;

/// The outcome of attempting to execute a claimed task, distinguishing the
/// three ways a dequeue/execution attempt can fail from a plain success.
#[derive(Debug)]
pub enum DequeueOutcome<T> {
    /// No claimable task was found this pass.
    Empty,
    /// A task was claimed and deserialized successfully.
    Claimed { task_id: String, payload: T },
    /// The payload stored under a claimed id failed to deserialize. The
    /// caller should publish a `task_error` event and must not retry.
    MalformedTask { task_id: String, error: String },
}

/// Raised once a task is mid-execution, distinguishing a lost claim (no
/// fault of the work itself) from an error the work itself raised.
#[derive(Debug)]
pub enum ExecutionFailure {
    /// The per-task lock expired before the worker finished; another
    /// claimant may now hold it. The result of this execution is discarded.
    ClaimLost,
    /// The analyzer or transform itself raised.
    ExecutionError(String),
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClaimLost => write!(f, "claim_lost"),
            Self::ExecutionError(message) => write!(f, "execution_error: {message}"),
        }
    }
}

/// Generic over any [`QueueBackend`]; adds the things a dumb backend must
/// not know about: starvation-avoiding shuffle, claim/heartbeat discipline,
/// and malformed-payload detection.
pub struct TaskQueue<B: QueueBackend> {
    backend: Arc<B>,
    lock_ttl_secs: u64,
}

impl<B: QueueBackend> TaskQueue<B> {
    pub fn new(backend: Arc<B>, lock_ttl_secs: u64) -> Self {
        Self {
            backend,
            lock_ttl_secs,
        }
    }

    pub async fn submit(&self, task: &Task) -> Result<(), QueueError>
    where
        Task: Serialize,
    {
        let data = serde_json::to_vec(task).map_err(|e| QueueError::Backend {
            message: format!("failed to serialize task: {e}"),
            source: Some(Box::new(e)),
        })?;
        self.backend
            .submit(&task.id, &data, task.timestamp.timestamp_millis())
            .await
    }

    /// Enumerate pending candidates, shuffle them, and race to claim the
    /// first one that succeeds. Returns `Empty` if every candidate was
    /// already claimed by the time this worker tried, `MalformedTask` if
    /// the winning claim's payload does not deserialize as `T`.
    pub async fn try_dequeue<T>(&self, worker_id: &str) -> Result<DequeueOutcome<T>, QueueError>
    where
        T: DeserializeOwned,
    {
        let mut candidates = self.backend.list_task_ids().await?;
        candidates.shuffle(&mut rand::thread_rng());

        for task_id in candidates {
            if self.backend.is_locked(&task_id).await? {
                continue;
            }
            if !self
                .backend
                .try_claim(&task_id, worker_id, self.lock_ttl_secs)
                .await?
            {
                continue;
            }

            let data = self.backend.get(&task_id).await?;
            return match serde_json::from_slice::<T>(&data) {
                Ok(payload) => Ok(DequeueOutcome::Claimed { task_id, payload }),
                Err(e) => Ok(DequeueOutcome::MalformedTask {
                    task_id,
                    error: e.to_string(),
                }),
            };
        }
        Ok(DequeueOutcome::Empty)
    }

    /// Extend the claim's heartbeat. Returns `Err(ExecutionFailure::ClaimLost)`
    /// if another claimant (or nobody) now holds the lock.
    pub async fn heartbeat(&self, task_id: &str, worker_id: &str) -> Result<(), ExecutionFailure> {
        let refreshed = self
            .backend
            .refresh_lock(task_id, worker_id, self.lock_ttl_secs)
            .await
            .map_err(|e| ExecutionFailure::ExecutionError(e.to_string()))?;
        if refreshed {
            Ok(())
        } else {
            Err(ExecutionFailure::ClaimLost)
        }
    }

    /// Remove a task once it has reached a terminal state.
    pub async fn delete(&self, task_id: &str) -> Result<(), QueueError> {
        self.backend.delete(task_id).await
    }

    pub async fn list_task_ids(&self) -> Result<Vec<String>, QueueError> {
        self.backend.list_task_ids().await
    }

    pub async fn is_locked(&self, task_id: &str) -> Result<bool, QueueError> {
        self.backend.is_locked(task_id).await
    }

    /// Fetch and deserialize one task's raw payload without claiming it.
    /// Used by monitoring tools that need a task's fields (e.g. `timestamp`
    /// for age checks) without affecting its claim state.
    pub async fn peek<T: DeserializeOwned>(&self, task_id: &str) -> Result<T, QueueError> {
        let data = self.backend.get(task_id).await?;
        serde_json::from_slice(&data).map_err(|e| QueueError::Backend {
            message: format!("failed to deserialize task {task_id}: {e}"),
            source: Some(Box::new(e)),
        })
    }
}
