//! `/assets` handlers: upload, list, fetch, download, expire/persist, and
//! variation removal/download. Task-driven work (analyze, transform) lives
//! in [`super::analyze`]/[`super::variations`]; everything here is a
//! synchronous row-and-blob operation.

use std::path::Path;

use axum::extract::{Multipart, Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Asset, StatName};
use crate::error::ApiError;
use crate::queue::QueueBackend;
use crate::ratelimit::RateLimitBackend;
use crate::storage::build_backend;

use super::auth::AuthContext;
use super::intrinsics::probe_intrinsic_meta;
use super::response::json_with_rate_limit;
use super::slug::slugify_asset_name;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
    pub backend: Option<String>,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 100;

pub async fn list_assets<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let mut assets = state
        .asset_repo
        .list_by_account(auth.account.id)
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;

    assets.retain(|asset| !asset.is_expired());

    if let Some(q) = &query.q {
        let needle = q.to_lowercase();
        assets.retain(|asset| asset.name.to_lowercase().contains(&needle));
    }
    if let Some(asset_type) = &query.asset_type {
        assets.retain(|asset| asset.asset_type.as_str() == asset_type);
    }
    match query.backend.as_deref() {
        Some("public") => assets.retain(|asset| !asset.secure),
        Some("secure") => assets.retain(|asset| asset.secure),
        _ => {}
    }
    if let Some(before) = query.before {
        assets.retain(|asset| asset.modified < before);
    }
    if let Some(after) = query.after {
        assets.retain(|asset| asset.modified > after);
    }

    assets.sort_by(|a, b| b.modified.cmp(&a.modified));
    assets.truncate(limit);

    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &assets))
}

pub async fn upload_asset<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut file_bytes: Option<bytes::Bytes> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut requested_name: Option<String> = None;
    let mut expire_seconds: Option<i64> = None;
    let mut secure = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_request(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::invalid_request(format!("could not read file field: {e}")))?,
                );
            }
            "name" => {
                requested_name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::invalid_request(e.to_string()))?,
                );
            }
            "expire" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::invalid_request(e.to_string()))?;
                expire_seconds = Some(
                    raw.parse::<i64>()
                        .map_err(|_| ApiError::invalid_request("expire must be an integer number of seconds"))?,
                );
            }
            "secure" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::invalid_request(e.to_string()))?;
                secure = raw == "1" || raw.eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }

    let data = file_bytes.ok_or_else(|| ApiError::invalid_request("missing file field"))?;
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    let ext = filename
        .as_deref()
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_lowercase();

    let base_name = requested_name
        .as_deref()
        .or(filename.as_deref().and_then(|f| Path::new(f).file_stem().and_then(|s| s.to_str())))
        .unwrap_or("asset");
    let name = slugify_asset_name(base_name);
    let name = if name.is_empty() { "asset".to_string() } else { name };

    let mut asset = Asset::new(auth.account.id, secure, name, ext.clone(), content_type);
    for (key, value) in probe_intrinsic_meta(asset.asset_type, &ext, &data) {
        asset.meta.insert(key, value);
    }
    if let Some(seconds) = expire_seconds {
        asset.expires = Some(Utc::now() + ChronoDuration::seconds(seconds));
    }

    let backend_settings = auth
        .account
        .backend_for(secure)
        .ok_or_else(|| ApiError::invalid_request("no backend configured for this security class"))?;
    let backend = build_backend(backend_settings);
    backend
        .store(&asset.store_key(), data.clone())
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;

    state
        .asset_repo
        .put(asset.clone())
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;

    let now = Utc::now();
    crate::accounts::record(state.stats.as_ref(), auth.account.id, StatName::Assets, 1, now).await;
    crate::accounts::record(
        state.stats.as_ref(),
        auth.account.id,
        StatName::Length,
        data.len() as i64,
        now,
    )
    .await;

    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &asset))
}

pub async fn get_asset<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath(uid): AxumPath<String>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let asset = load_live_asset(&state, auth.account.id, &uid).await?;
    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &asset))
}

pub async fn download_asset<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath(uid): AxumPath<String>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let asset = load_live_asset(&state, auth.account.id, &uid).await?;
    let backend_settings = auth
        .account
        .backend_for(asset.secure)
        .ok_or_else(|| ApiError::error("no backend configured for this asset's security class"))?;
    let backend = build_backend(backend_settings);
    let data = backend
        .retrieve(&asset.store_key())
        .await
        .map_err(|e| ApiError::not_found(e.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        asset.content_type.parse().unwrap_or_else(|_| "application/octet-stream".parse().unwrap()),
    );
    super::response::apply_rate_limit_headers(&mut headers, auth.rate_limit);
    Ok((StatusCode::OK, headers, data).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ExpireRequest {
    pub seconds: i64,
}

pub async fn expire_asset<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath(uid): AxumPath<String>,
    axum::Json(body): axum::Json<ExpireRequest>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut asset = load_live_asset(&state, auth.account.id, &uid).await?;
    asset.expires = Some(Utc::now() + ChronoDuration::seconds(body.seconds));
    asset.touch();
    state
        .asset_repo
        .put(asset.clone())
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;
    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &asset))
}

pub async fn persist_asset<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath(uid): AxumPath<String>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut asset = load_live_asset(&state, auth.account.id, &uid).await?;
    asset.expires = None;
    asset.touch();
    state
        .asset_repo
        .put(asset.clone())
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;
    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &asset))
}

pub async fn delete_variation<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath((uid, name)): AxumPath<(String, String)>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut asset = load_live_asset(&state, auth.account.id, &uid).await?;
    let Some(variation) = asset.variations.remove(&name) else {
        return Err(ApiError::not_found(format!("no such variation: {name}")));
    };

    let backend_settings = auth
        .account
        .backend_for(asset.secure)
        .ok_or_else(|| ApiError::error("no backend configured for this asset's security class"))?;
    let backend = build_backend(backend_settings);
    let key = variation.store_key(&asset.name, &asset.uid, &name);
    backend
        .delete(&key)
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;

    asset.touch();
    state
        .asset_repo
        .put(asset.clone())
        .await
        .map_err(|e| ApiError::error(e.to_string()))?;

    let now = Utc::now();
    crate::accounts::record(state.stats.as_ref(), auth.account.id, StatName::Variations, -1, now).await;

    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &asset))
}

pub async fn download_variation<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    AxumPath((uid, name)): AxumPath<(String, String)>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let asset = load_live_asset(&state, auth.account.id, &uid).await?;
    let variation = asset
        .variations
        .get(&name)
        .ok_or_else(|| ApiError::not_found(format!("no such variation: {name}")))?;

    let backend_settings = auth
        .account
        .backend_for(asset.secure)
        .ok_or_else(|| ApiError::error("no backend configured for this asset's security class"))?;
    let backend = build_backend(backend_settings);
    let key = variation.store_key(&asset.name, &asset.uid, &name);
    let data = backend
        .retrieve(&key)
        .await
        .map_err(|e| ApiError::not_found(e.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        variation
            .content_type
            .parse()
            .unwrap_or_else(|_| "application/octet-stream".parse().unwrap()),
    );
    super::response::apply_rate_limit_headers(&mut headers, auth.rate_limit);
    Ok((StatusCode::OK, headers, data).into_response())
}

/// Load an asset by uid scoped to `account_id`, treating an expired asset as
/// not found per the "logically absent" invariant.
pub(super) async fn load_live_asset<Q, R>(
    state: &AppState<Q, R>,
    account_id: Uuid,
    uid: &str,
) -> Result<Asset, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let asset = state
        .asset_repo
        .by_account_and_uid(account_id, uid)
        .await
        .map_err(|_| ApiError::not_found(format!("no such asset: {uid}")))?;
    if asset.is_expired() {
        return Err(ApiError::not_found(format!("no such asset: {uid}")));
    }
    Ok(asset)
}

#[derive(Debug, Deserialize)]
pub struct BulkUidsRequest {
    pub uids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkExpireRequest {
    pub uids: Vec<String>,
    pub seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub uid: String,
    pub ok: bool,
    pub error: Option<String>,
}

pub async fn bulk_expire<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    axum::Json(body): axum::Json<BulkExpireRequest>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut results = Vec::with_capacity(body.uids.len());
    for uid in body.uids {
        let outcome = async {
            let mut asset = load_live_asset(&state, auth.account.id, &uid).await?;
            asset.expires = Some(Utc::now() + ChronoDuration::seconds(body.seconds));
            asset.touch();
            state
                .asset_repo
                .put(asset)
                .await
                .map_err(|e| ApiError::error(e.to_string()))
        }
        .await;
        results.push(match outcome {
            Ok(()) => BulkResult { uid, ok: true, error: None },
            Err(e) => BulkResult { uid, ok: false, error: Some(e.to_string()) },
        });
    }
    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &results))
}

pub async fn bulk_persist<Q, R>(
    State(state): State<AppState<Q, R>>,
    auth: AuthContext,
    axum::Json(body): axum::Json<BulkUidsRequest>,
) -> Result<Response, ApiError>
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    let mut results = Vec::with_capacity(body.uids.len());
    for uid in body.uids {
        let outcome = async {
            let mut asset = load_live_asset(&state, auth.account.id, &uid).await?;
            asset.expires = None;
            asset.touch();
            state
                .asset_repo
                .put(asset)
                .await
                .map_err(|e| ApiError::error(e.to_string()))
        }
        .await;
        results.push(match outcome {
            Ok(()) => BulkResult { uid, ok: true, error: None },
            Err(e) => BulkResult { uid, ok: false, error: Some(e.to_string()) },
        });
    }
    Ok(json_with_rate_limit(StatusCode::OK, auth.rate_limit, &results))
}
