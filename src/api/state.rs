//! Shared application state threaded through every handler via
//! [`axum::extract::State`].

use std::sync::Arc;

use crate::accounts::{AccountRepository, AssetRepository, StatsSink};
use crate::config::Config;
use crate::events::EventBus;
use crate::queue::{QueueBackend, TaskQueue};
use crate::ratelimit::{ApiLogRing, RateLimitBackend, RateLimiter};
use crate::registry::{AnalyzerRegistry, TransformRegistry};

/// Everything a handler needs, generic over the queue and rate-limit
/// backends so the same router builds against either the in-memory
/// backends (tests) or the Redis-backed ones (the `h51-api` binary).
pub struct AppState<Q: QueueBackend, R: RateLimitBackend> {
    pub config: Arc<Config>,
    pub queue: Arc<TaskQueue<Q>>,
    pub event_bus: EventBus,
    pub account_repo: Arc<dyn AccountRepository>,
    pub asset_repo: Arc<dyn AssetRepository>,
    pub stats: Arc<dyn StatsSink>,
    pub rate_limiter: Arc<RateLimiter<R>>,
    pub api_log: Arc<ApiLogRing>,
    pub analyzer_registry: Arc<AnalyzerRegistry>,
    pub transform_registry: Arc<TransformRegistry>,
}

// Derived `Clone` would require `Q: Clone`/`R: Clone`, which neither
// backend needs to satisfy — every field is already behind an `Arc` (or is
// `Copy`-free but cheaply cloneable itself, like `EventBus`).
impl<Q: QueueBackend, R: RateLimitBackend> Clone for AppState<Q, R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            queue: self.queue.clone(),
            event_bus: self.event_bus.clone(),
            account_repo: self.account_repo.clone(),
            asset_repo: self.asset_repo.clone(),
            stats: self.stats.clone(),
            rate_limiter: self.rate_limiter.clone(),
            api_log: self.api_log.clone(),
            analyzer_registry: self.analyzer_registry.clone(),
            transform_registry: self.transform_registry.clone(),
        }
    }
}
