//! The HTTP front-end: axum handlers wired to the routes in the external
//! interface table, all generic over the pluggable task-queue and
//! rate-limit backends via [`state::AppState`].

pub mod analyze;
pub mod assets;
pub mod auth;
pub mod intrinsics;
pub mod response;
pub mod slug;
pub mod state;
pub mod variations;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::queue::QueueBackend;
use crate::ratelimit::RateLimitBackend;

pub use state::AppState;

/// Build the full router for one [`AppState`]. Callers (the `api_server`
/// binary, integration tests) supply the concrete backends.
pub fn build_router<Q, R>(state: AppState<Q, R>) -> Router
where
    Q: QueueBackend + 'static,
    R: RateLimitBackend + 'static,
{
    Router::new()
        .route("/assets", get(assets::list_assets).put(assets::upload_asset))
        .route("/assets/{uid}", get(assets::get_asset))
        .route("/assets/{uid}/download", get(assets::download_asset))
        .route("/assets/{uid}/expire", post(assets::expire_asset))
        .route("/assets/{uid}/persist", post(assets::persist_asset))
        .route("/assets/{uid}/analyze", post(analyze::analyze_asset))
        .route("/assets/{uid}/variations", put(variations::put_variations))
        .route(
            "/assets/{uid}/variations/{name}",
            delete(assets::delete_variation),
        )
        .route(
            "/assets/{uid}/variations/{name}/download",
            get(assets::download_variation),
        )
        .route("/assets/analyze", post(analyze::bulk_analyze))
        .route("/assets/expire", post(assets::bulk_expire))
        .route("/assets/persist", post(assets::bulk_persist))
        .route("/assets/transform", put(variations::bulk_transform))
        .with_state(state)
}
