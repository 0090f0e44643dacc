//! The worker state machine: claims tasks from the queue, runs the
//! analyzer/transform pipelines (§4.8/§4.9), and publishes terminal events.
//!
//! State machine: *initializing → idle → claiming → executing →
//! (publishing | erroring) → idle*; *idle → shutting_down* on receipt of a
//! shutdown broadcast; *idle → exiting* when `idle_lifespan` elapses
//! without a claim. Concurrency within a worker is single-threaded per
//! task: the main loop `await`s one task at a time to completion before
//! claiming another, mirroring the source's "PIL image state is not safely
//! shared" constraint — multiple workers run as separate OS processes
//! instead of intra-process tasks.

pub mod control;
pub mod pipeline;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::accounts::{AccountRepository, AccountRepositoryError, AssetRepository, AssetRepositoryError, StatsSink};
use crate::domain::{Task, TaskPayload};
use crate::events::{EventBus, TaskEvent};
use crate::notifier::WebhookNotifier;
use crate::queue::{DequeueOutcome, ExecutionFailure, QueueBackend, TaskQueue};
use crate::registry::{AnalyzerRegistry, TransformRegistry};
use crate::storage::{build_backend, BlobError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Initializing,
    Idle,
    Claiming,
    Executing,
    Publishing,
    Erroring,
    ShuttingDown,
    Exiting,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("account lookup failed: {0}")]
    Account(#[from] AccountRepositoryError),
    #[error("asset lookup failed: {0}")]
    Asset(#[from] AssetRepositoryError),
    #[error("blob storage error: {0}")]
    Storage(#[from] BlobError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] pipeline::PipelineError),
    #[error("no backend configured for this asset's security class")]
    NoBackendConfigured,
}

pub struct WorkerConfig {
    pub idle_lifespan: Duration,
    /// Heartbeat refresh is done once before and once after each pipeline
    /// run, not on a timer mid-execution — the image/transform work in this
    /// crate is synchronous CPU-bound code with no natural yield point to
    /// hook a periodic refresh into. Kept here for the API surface the
    /// original's per-task heartbeat interval occupies.
    pub max_status_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_lifespan: Duration::from_secs(300),
            max_status_interval: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
        }
    }
}

pub struct Worker<B: QueueBackend> {
    worker_id: String,
    queue: Arc<TaskQueue<B>>,
    event_bus: EventBus,
    account_repo: Arc<dyn AccountRepository>,
    asset_repo: Arc<dyn AssetRepository>,
    stats: Arc<dyn StatsSink>,
    analyzer_registry: Arc<AnalyzerRegistry>,
    transform_registry: Arc<TransformRegistry>,
    notifier: Arc<WebhookNotifier>,
    config: WorkerConfig,
}

impl<B: QueueBackend> Worker<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<TaskQueue<B>>,
        event_bus: EventBus,
        account_repo: Arc<dyn AccountRepository>,
        asset_repo: Arc<dyn AssetRepository>,
        stats: Arc<dyn StatsSink>,
        analyzer_registry: Arc<AnalyzerRegistry>,
        transform_registry: Arc<TransformRegistry>,
        notifier: Arc<WebhookNotifier>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            worker_id: format!("h51_asset_worker_{}", uuid::Uuid::new_v4()),
            queue,
            event_bus,
            account_repo,
            asset_repo,
            stats,
            analyzer_registry,
            transform_registry,
            notifier,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the main loop until `shutdown` fires or `idle_lifespan` elapses
    /// without a claim. Returns the terminal state reached.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerState {
        let mut state = WorkerState::Initializing;
        let mut last_claim_at = Instant::now();

        loop {
            if *shutdown.borrow() {
                state = WorkerState::ShuttingDown;
                break;
            }
            if last_claim_at.elapsed() >= self.config.idle_lifespan {
                state = WorkerState::Exiting;
                break;
            }

            state = WorkerState::Claiming;
            let outcome = match self.queue.try_dequeue::<Task>(&self.worker_id).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(%error, "failed to poll task queue");
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
            };

            match outcome {
                DequeueOutcome::Empty => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                    state = WorkerState::Idle;
                    continue;
                }
                DequeueOutcome::MalformedTask { task_id, error } => {
                    tracing::warn!(%task_id, %error, "malformed task payload, discarding");
                    self.event_bus.publish(TaskEvent::error(&task_id, error));
                    let _ = self.queue.delete(&task_id).await;
                    last_claim_at = Instant::now();
                    continue;
                }
                DequeueOutcome::Claimed { task_id, payload } => {
                    last_claim_at = Instant::now();
                    state = WorkerState::Executing;
                    self.event_bus.publish(TaskEvent::started(&task_id));

                    match self.execute(&task_id, &payload).await {
                        ExecuteResult::Completed(asset) => {
                            state = WorkerState::Publishing;
                            self.event_bus.publish(TaskEvent::completed(&task_id));
                            if let Some(url) = &payload.notification_url {
                                let body = serde_json::to_vec(&asset).unwrap_or_default();
                                if let Ok(account) = self.account_repo.by_id(payload.account_id).await {
                                    self.notifier.notify(url, &account.api_key, body).await;
                                }
                            }
                            let _ = self.queue.delete(&task_id).await;
                        }
                        ExecuteResult::Failed(message) => {
                            state = WorkerState::Erroring;
                            tracing::error!(%task_id, error = %message, "task execution failed");
                            self.event_bus.publish(TaskEvent::error(&task_id, message));
                            let _ = self.queue.delete(&task_id).await;
                        }
                        ExecuteResult::ClaimLost => {
                            tracing::warn!(%task_id, "lock expired mid-execution, discarding result");
                        }
                    }
                    state = WorkerState::Idle;
                }
            }
        }
        state
    }

    async fn execute(&self, task_id: &str, task: &Task) -> ExecuteResult {
        if let Err(ExecutionFailure::ClaimLost) = self.queue.heartbeat(task_id, &self.worker_id).await {
            return ExecuteResult::ClaimLost;
        }

        match self.run_task(task).await {
            Ok(asset) => match self.queue.heartbeat(task_id, &self.worker_id).await {
                Ok(()) => ExecuteResult::Completed(asset),
                Err(ExecutionFailure::ClaimLost) => ExecuteResult::ClaimLost,
                Err(other) => ExecuteResult::Failed(other.to_string()),
            },
            Err(error) => ExecuteResult::Failed(error.to_string()),
        }
    }

    /// Run a claimed task's pipeline to completion, returning the asset as
    /// it stood immediately after the update was persisted — the webhook
    /// body (when `notification_url` is set) is this asset's JSON form.
    async fn run_task(&self, task: &Task) -> Result<crate::domain::Asset, WorkerError> {
        let account = self.account_repo.by_id(task.account_id).await?;
        let mut asset = self.asset_repo.by_id(task.asset_id).await?;
        let backend_settings = account
            .backend_for(asset.secure)
            .ok_or(WorkerError::NoBackendConfigured)?;
        let backend = build_backend(backend_settings);
        let blob = backend.retrieve(&asset.store_key()).await?;

        match &task.payload {
            TaskPayload::Analyze { steps } => {
                pipeline::run_analyze_pipeline(&mut asset, &blob, steps, &self.analyzer_registry)
                    .await?;
                self.asset_repo.put(asset.clone()).await?;
            }
            TaskPayload::GenerateVariation {
                variation_name,
                steps,
            } => {
                let ctx = crate::registry::TransformContext {
                    asset: &asset,
                    original_blob: &blob,
                    variation_name,
                    state: crate::registry::FrameState::Empty,
                    history: vec![],
                };
                let ctx = pipeline::run_transform_pipeline(ctx, steps, &self.transform_registry)
                    .await?;
                let versioned = steps
                    .last()
                    .map(|step| step.settings["versioned"].as_bool().unwrap_or(true))
                    .unwrap_or(true);
                let (content_type, ext, data) = match ctx.state {
                    crate::registry::FrameState::Encoded {
                        content_type,
                        ext,
                        data,
                    } => (content_type, ext, data),
                    _ => unreachable!("run_transform_pipeline guarantees Encoded state"),
                };
                pipeline::store_variation(
                    self.asset_repo.as_ref(),
                    self.stats.as_ref(),
                    backend,
                    &mut asset,
                    variation_name,
                    content_type,
                    ext,
                    data,
                    versioned,
                )
                .await?;
            }
        }
        Ok(asset)
    }
}

enum ExecuteResult {
    Completed(crate::domain::Asset),
    Failed(String),
    ClaimLost,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{Account, InMemoryAccountRepository, InMemoryAssetRepository, InMemoryStatsSink};
    use crate::domain::{Asset, AnalyzeStep, BackendSettings, TaskPayload};
    use crate::queue::InMemoryQueueBackend;
    use crate::registry::{build_default_analyzer_registry, build_default_transform_registry};
    use serde_json::json;
    use uuid::Uuid;

    fn solid_png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([5, 6, 7]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    async fn build_worker(
        dir: &std::path::Path,
    ) -> (
        Worker<InMemoryQueueBackend>,
        Arc<TaskQueue<InMemoryQueueBackend>>,
        Arc<InMemoryAccountRepository>,
        Arc<InMemoryAssetRepository>,
    ) {
        let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryQueueBackend::new()), 60));
        let account_repo = InMemoryAccountRepository::new().into_shared();
        let asset_repo = InMemoryAssetRepository::new().into_shared();
        let stats = InMemoryStatsSink::new().into_shared();

        let mut account = Account::new("acme", "key-123");
        account.public_backend = Some(BackendSettings::Local {
            root: dir.to_string_lossy().to_string(),
        });

        let worker = Worker::new(
            queue.clone(),
            EventBus::new(),
            account_repo.clone(),
            asset_repo.clone(),
            stats,
            Arc::new(build_default_analyzer_registry()),
            Arc::new(build_default_transform_registry()),
            Arc::new(WebhookNotifier::new()),
            WorkerConfig {
                poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );
        account_repo.put(account).await.unwrap();
        (worker, queue, account_repo, asset_repo)
    }

    #[tokio::test]
    async fn analyze_task_runs_to_completion_and_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, queue, account_repo, asset_repo) = build_worker(dir.path()).await;
        let account = account_repo.by_api_key("key-123").await.unwrap();

        let mut asset = Asset::new(
            account.id,
            false,
            "photo".to_string(),
            "png".to_string(),
            "image/png".to_string(),
        );
        let blob = solid_png_bytes();
        tokio::fs::write(dir.path().join(asset.store_key()), &blob)
            .await
            .unwrap();
        let asset_id = asset.id;
        asset_repo.put(asset.clone()).await.unwrap();

        let task = Task::new(
            account.id,
            asset_id,
            None,
            TaskPayload::Analyze {
                steps: vec![AnalyzeStep {
                    analyzer_name: "dominant_colors".to_string(),
                    settings: json!({}),
                }],
            },
        );
        queue.submit(&task).await.unwrap();

        let state = worker_run_once(&worker, &queue).await;
        assert_eq!(state, WorkerState::Idle);

        let updated = asset_repo.by_id(asset_id).await.unwrap();
        assert!(updated.meta["image"]["dominant_colors"].is_object());
        assert!(queue.list_task_ids().await.unwrap().is_empty());
    }

    /// Run the worker loop until the submitted task has been claimed and
    /// removed, then signal shutdown so `run` returns instead of idling.
    async fn worker_run_once(
        worker: &Worker<InMemoryQueueBackend>,
        queue: &Arc<TaskQueue<InMemoryQueueBackend>>,
    ) -> WorkerState {
        let (tx, rx) = watch::channel(false);
        let run_future = worker.run(rx);
        tokio::pin!(run_future);
        tokio::select! {
            state = &mut run_future => state,
            _ = wait_until_queue_empty(queue) => {
                let _ = tx.send(true);
                run_future.await
            }
        }
    }

    async fn wait_until_queue_empty(queue: &Arc<TaskQueue<InMemoryQueueBackend>>) {
        loop {
            if queue.list_task_ids().await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
