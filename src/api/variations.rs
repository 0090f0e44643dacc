//! `PUT /assets/{uid}/variations` and its bulk counterpart.
//!
//! A request names one or more variations, each with its own ordered
//! transform list; exactly one `final` transform must appear, and only as
//! the list's last step (enforced here, not by the registry types
//! themselves, per [`crate::registry::transform`]'s contract).

use std::collections::HashMap;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AssetType, Task, TaskPayload, TransformStep};
use crate::error::ApiError;
use crate::queue::QueueBackend;
use crate::ratelimit::RateLimitBackend;

use super::analyze::run_or_enqueue;
use super::assets::{load_live_asset, BulkResult};
use super::auth::AuthContext;
use super::response::json_with_rate_limit;
use super::slug::slugify_variation_name;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VariationsRequest {
    pub variations: HashMap<String, Vec<(String, Value)>>,
    pub notification_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueuedVariation {
    variation_name: String,
    task_id: String,
}

pub async fn put_variations<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath(uid): AxumPath<String>,
    axum::Json(body): axum::Json<VariationsRequest>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    if body.variations.len() > state.config.max_variations_per_request {
        return Err(ApiError::invalid_request(format!(
            "at most {} variations may be requested at once",
            state.config.max_variations_per_request
        )));
    }

    let asset = load_live_asset(&state, auth.account.id, &uid).await?;

    let mut tasks = Vec::with_capacity(body.variations.len());
    let mut arg_errors: HashMap<String, Vec<String>> = HashMap::new();
    for (variation_name, steps) in body.variations {
        match resolve_transform_steps(&state, asset.asset_type, &variation_name, steps) {
            Ok(steps) => tasks.push(Task::new(
                auth.account.id,
                asset.id,
                body.notification_url.clone(),
                TaskPayload::GenerateVariation { variation_name, steps },
            )),
            Err(messages) => {
                arg_errors.insert(variation_name, messages);
            }
        }
    }

    if !arg_errors.is_empty() {
        return Err(ApiError::invalid_request("invalid variation request").with_arg_errors(arg_errors));
    }

    match tasks.len() {
        0 => Err(ApiError::invalid_request("no variations given")),
        1 if body.notification_url.is_none() => {
            run_or_enqueue(&state, &auth, tasks.into_iter().next().expect("len == 1")).await
        }
        _ => {
            let mut queued = Vec::with_capacity(tasks.len());
            for task in tasks {
                let variation_name = match &task.payload {
                    TaskPayload::GenerateVariation { variation_name, .. } => variation_name.clone(),
                    TaskPayload::Analyze { .. } => unreachable!("only GenerateVariation tasks built here"),
                };
                state
                    .queue
                    .submit(&task)
                    .await
                    .map_err(|e| ApiError::error(e.to_string()))?;
                queued.push(QueuedVariation { variation_name, task_id: task.id });
            }
            Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &queued))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkTransformRequest {
    pub uids: Vec<String>,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub variations: HashMap<String, Vec<(String, Value)>>,
    #[serde(default)]
    pub per_uid_variations: HashMap<String, HashMap<String, Vec<(String, Value)>>>,
    pub notification_url: Option<String>,
}

pub async fn bulk_transform<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    axum::Json(body): axum::Json<BulkTransformRequest>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut results = Vec::with_capacity(body.uids.len());
    for uid in &body.uids {
        let outcome = async {
            let variations = if body.local {
                body.per_uid_variations
                    .get(uid)
                    .cloned()
                    .ok_or_else(|| ApiError::invalid_request(format!("no variations given for uid {uid}")))?
            } else {
                body.variations.clone()
            };
            if variations.len() > state.config.max_variations_per_request {
                return Err(ApiError::invalid_request(format!(
                    "at most {} variations may be requested at once",
                    state.config.max_variations_per_request
                )));
            }

            let asset = load_live_asset(&state, auth.account.id, uid).await?;
            for (variation_name, steps) in variations {
                let steps = resolve_transform_steps(&state, asset.asset_type, &variation_name, steps)
                    .map_err(|messages| ApiError::invalid_request(messages.join("; ")))?;
                let task = Task::new(
                    auth.account.id,
                    asset.id,
                    body.notification_url.clone(),
                    TaskPayload::GenerateVariation { variation_name, steps },
                );
                state
                    .queue
                    .submit(&task)
                    .await
                    .map_err(|e| ApiError::error(e.to_string()))?;
            }
            Ok(())
        }
        .await;
        results.push(match outcome {
            Ok(()) => BulkResult { uid: uid.clone(), ok: true, error: None },
            Err(e) => BulkResult { uid: uid.clone(), ok: false, error: Some(e.to_string()) },
        });
    }
    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &results))
}

fn resolve_transform_steps<Q: QueueBackend, R: RateLimitBackend>(
    state: &AppState<Q, R>,
    asset_type: AssetType,
    variation_name: &str,
    steps: Vec<(String, Value)>,
) -> Result<Vec<TransformStep>, Vec<String>> {
    let mut messages = Vec::new();

    if slugify_variation_name(variation_name) != variation_name {
        messages.push(format!("variation name does not normalize to itself: {variation_name}"));
    }
    if steps.is_empty() {
        messages.push("at least one transform is required".to_string());
        return Err(messages);
    }

    let mut resolved = Vec::with_capacity(steps.len());
    let last_index = steps.len() - 1;
    for (index, (name, raw_settings)) in steps.into_iter().enumerate() {
        let Some(transform) = state.transform_registry.get(asset_type, &name) else {
            messages.push(format!("unknown transform for asset type {}: {name}", asset_type.as_str()));
            continue;
        };
        if transform.is_final() && index != last_index {
            messages.push(format!("final transform {name} must be the last step"));
        }
        if !transform.is_final() && index == last_index {
            messages.push("the last step must be a final transform".to_string());
        }
        match transform.schema().validate(&raw_settings) {
            Ok(settings) => resolved.push(TransformStep { transform_name: name, settings }),
            Err(field_errors) => {
                for (field, field_messages) in field_errors {
                    messages.push(format!("{name}.{field}: {}", field_messages.join(", ")));
                }
            }
        }
    }

    if messages.is_empty() {
        Ok(resolved)
    } else {
        Err(messages)
    }
}
