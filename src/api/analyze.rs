//! `POST /assets/{uid}/analyze` and its bulk counterpart.
//!
//! Analyzer lists are validated against the registry/schema synchronously,
//! before anything is enqueued, per the "client input errors never enqueue"
//! rule in the error-handling design. A request with no `notification_url`
//! subscribes to the event bus *before* submitting the task, to avoid the
//! missed-publish race, then blocks for the terminal event and re-reads the
//! asset for a strongly-consistent response body.

use std::collections::HashMap;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AnalyzeStep, Task, TaskPayload};
use crate::error::ApiError;
use crate::events::EventType;
use crate::queue::QueueBackend;
use crate::ratelimit::RateLimitBackend;

use super::assets::{load_live_asset, BulkResult};
use super::auth::AuthContext;
use super::response::json_with_rate_limit;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub analyzers: Vec<(String, Value)>,
    pub notification_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueuedResponse<'a> {
    task_id: &'a str,
    status: &'static str,
}

pub async fn analyze_asset<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath(uid): AxumPath<String>,
    axum::Json(body): axum::Json<AnalyzeRequest>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let asset = load_live_asset(&state, auth.account.id, &uid).await?;
    let steps = resolve_analyze_steps(&state, asset.asset_type, body.analyzers)?;

    let task = Task::new(
        auth.account.id,
        asset.id,
        body.notification_url.clone(),
        TaskPayload::Analyze { steps },
    );

    run_or_enqueue(&state, &auth, task).await
}

#[derive(Debug, Deserialize)]
pub struct BulkAnalyzeRequest {
    pub uids: Vec<String>,
    #[serde(default)]
    pub local: bool,
    /// Global analyzer list, used when `local` is false (or absent).
    #[serde(default)]
    pub analyzers: Vec<(String, Value)>,
    /// Per-uid analyzer lists, used when `local` is true.
    #[serde(default)]
    pub per_uid_analyzers: HashMap<String, Vec<(String, Value)>>,
    pub notification_url: Option<String>,
}

pub async fn bulk_analyze<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    axum::Json(body): axum::Json<BulkAnalyzeRequest>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut results = Vec::with_capacity(body.uids.len());
    for uid in &body.uids {
        let outcome = async {
            let analyzers = if body.local {
                body.per_uid_analyzers
                    .get(uid)
                    .cloned()
                    .ok_or_else(|| ApiError::invalid_request(format!("no analyzers given for uid {uid}")))?
            } else {
                body.analyzers.clone()
            };

            let asset = load_live_asset(&state, auth.account.id, uid).await?;
            let steps = resolve_analyze_steps(&state, asset.asset_type, analyzers)?;
            let task = Task::new(
                auth.account.id,
                asset.id,
                body.notification_url.clone(),
                TaskPayload::Analyze { steps },
            );
            state
                .queue
                .submit(&task)
                .await
                .map_err(|e| ApiError::error(e.to_string()))
        }
        .await;
        results.push(match outcome {
            Ok(()) => BulkResult { uid: uid.clone(), ok: true, error: None },
            Err(e) => BulkResult { uid: uid.clone(), ok: false, error: Some(e.to_string()) },
        });
    }
    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &results))
}

fn resolve_analyze_steps<Q: QueueBackend, R: RateLimitBackend>(
    state: &AppState<Q, R>,
    asset_type: crate::domain::AssetType,
    analyzers: Vec<(String, Value)>,
) -> Result<Vec<AnalyzeStep>, ApiError> {
    let mut steps = Vec::with_capacity(analyzers.len());
    let mut arg_errors: HashMap<String, Vec<String>> = HashMap::new();

    for (name, raw_settings) in analyzers {
        let Some(analyzer) = state.analyzer_registry.get(asset_type, &name) else {
            arg_errors
                .entry(name.clone())
                .or_default()
                .push(format!("unknown analyzer for asset type {}", asset_type.as_str()));
            continue;
        };
        match analyzer.schema().validate(&raw_settings) {
            Ok(settings) => steps.push(AnalyzeStep { analyzer_name: name, settings }),
            Err(field_errors) => {
                for (field, messages) in field_errors {
                    arg_errors.entry(format!("{name}.{field}")).or_default().extend(messages);
                }
            }
        }
    }

    if !arg_errors.is_empty() {
        return Err(ApiError::invalid_request("invalid analyzer settings").with_arg_errors(arg_errors));
    }
    Ok(steps)
}

/// Submit `task`; when it carries a `notification_url`, return immediately
/// once it is enqueued, otherwise subscribe-then-submit and block for the
/// terminal event, returning the asset's fresh state on success.
pub(super) async fn run_or_enqueue<Q, R>(
    state: &AppState<Q, R>,
    auth: &AuthContext,
    task: Task,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    if task.notification_url.is_some() {
        state
            .queue
            .submit(&task)
            .await
            .map_err(|e| ApiError::error(e.to_string()))?;
        return Ok(json_with_rate_limit(
            StatusCode::OK,
            auth.rate_limit,
            &QueuedResponse { task_id: &task.id, status: "queued" },
        ));
    }

    let subscription = state.event_bus.subscribe();
    state
        .queue
        .submit(&task)
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;

    let event = subscription
        .await_terminal(&task.id)
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;

    match event.event_type {
        EventType::TaskCompleted => {
            let asset = state
                .asset_repo
                .by_id(task.asset_id)
                .await
                .map_err(|e| ApiError::error(e.to_string()))?;
            Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &asset))
        }
        EventType::TaskError => Err(ApiError::error(
            event.reason.unwrap_or_else(|| "task failed".to_string()),
        )),
        EventType::TaskStarted => unreachable!("await_terminal only returns terminal events"),
    }
}
