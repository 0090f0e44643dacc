//! Drives the real `Worker` state machine against in-memory backends: a
//! submitted task is claimed, run to completion (or failure), and the
//! terminal lifecycle event is published on the bus before the worker exits
//! voluntarily once `idle_lifespan` elapses.

use std::sync::Arc;
use std::time::Duration;

use h51::accounts::{
    AccountRepository, AssetRepository, InMemoryAccountRepository, InMemoryAssetRepository,
    InMemoryStatsSink,
};
use h51::domain::{Account, AnalyzeStep, Asset, BackendSettings, Task, TaskPayload};
use h51::events::EventBus;
use h51::notifier::WebhookNotifier;
use h51::queue::{InMemoryQueueBackend, TaskQueue};
use h51::registry::{build_default_analyzer_registry, build_default_transform_registry};
use h51::worker::{Worker, WorkerConfig};
use tokio::sync::watch;

#[tokio::test]
async fn unknown_analyzer_fails_the_task_and_publishes_an_error_event() {
    let dir = tempfile::tempdir().unwrap();

    let account_repo = InMemoryAccountRepository::new();
    let mut account = Account::new("acme", "key");
    account.public_backend = Some(BackendSettings::Local {
        root: dir.path().to_string_lossy().to_string(),
    });
    account_repo.put(account.clone()).await.unwrap();

    let asset_repo = InMemoryAssetRepository::new();
    let mut asset = Asset::new(account.id, false, "doc".to_string(), "bin".to_string(), "application/octet-stream".to_string());
    let backend = h51::storage::build_backend(account.backend_for(false).unwrap());
    backend.store(&asset.store_key(), bytes::Bytes::from_static(b"payload")).await.unwrap();
    asset_repo.put(asset.clone()).await.unwrap();

    let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryQueueBackend::new()), 30));
    let task = Task::new(
        account.id,
        asset.id,
        None,
        TaskPayload::Analyze {
            steps: vec![AnalyzeStep {
                analyzer_name: "does_not_exist".to_string(),
                settings: serde_json::json!({}),
            }],
        },
    );
    queue.submit(&task).await.unwrap();

    let event_bus = EventBus::new();
    let subscription = event_bus.subscribe();

    let worker = Worker::new(
        queue.clone(),
        event_bus,
        Arc::new(account_repo),
        Arc::new(asset_repo),
        Arc::new(InMemoryStatsSink::default()),
        Arc::new(build_default_analyzer_registry()),
        Arc::new(build_default_transform_registry()),
        Arc::new(WebhookNotifier::new()),
        WorkerConfig {
            idle_lifespan: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        },
    );

    let task_id = task.id.clone();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_final_state, event) = tokio::join!(worker.run(shutdown_rx), subscription.await_terminal(&task_id));
    let event = event.unwrap();
    assert_eq!(event.task_id, task_id);
    assert!(event.reason.is_some(), "expected a failure reason for the unknown analyzer");

    // The task is terminal either way (failed), so it must be gone.
    assert!(queue.list_task_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn worker_exits_voluntarily_once_idle_lifespan_elapses() {
    let queue = Arc::new(TaskQueue::new(Arc::new(InMemoryQueueBackend::new()), 30));
    let worker = Worker::new(
        queue,
        EventBus::new(),
        Arc::new(InMemoryAccountRepository::new()),
        Arc::new(InMemoryAssetRepository::new()),
        Arc::new(InMemoryStatsSink::default()),
        Arc::new(build_default_analyzer_registry()),
        Arc::new(build_default_transform_registry()),
        Arc::new(WebhookNotifier::new()),
        WorkerConfig {
            idle_lifespan: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        },
    );

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let final_state = worker.run(shutdown_rx).await;
    assert_eq!(final_state, h51::worker::WorkerState::Exiting);
}
