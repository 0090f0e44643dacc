//! Shared startup plumbing for the `h51-api` and `asset_worker` binaries:
//! both need the same Redis-backed repositories, queue, registries, and
//! notifier, differing only in what they build on top (a router vs. a
//! worker loop).

use std::sync::Arc;

use redis::aio::MultiplexedConnection;

use crate::accounts::{AccountRepository, AssetRepository, RedisAccountRepository, RedisAssetRepository, RedisStatsSink, StatsSink};
use crate::config::Config;
use crate::events::EventBus;
use crate::notifier::WebhookNotifier;
use crate::queue::{RedisQueueBackend, TaskQueue};
use crate::ratelimit::{ApiLogRing, RateLimiter, RedisRateLimitBackend};
use crate::registry::{build_default_analyzer_registry, build_default_transform_registry, AnalyzerRegistry, TransformRegistry};

/// Everything both binaries need, built once from [`Config`].
pub struct Shared {
    pub config: Arc<Config>,
    pub queue: Arc<TaskQueue<RedisQueueBackend>>,
    pub event_bus: EventBus,
    pub account_repo: Arc<dyn AccountRepository>,
    pub asset_repo: Arc<dyn AssetRepository>,
    pub stats: Arc<dyn StatsSink>,
    pub analyzer_registry: Arc<AnalyzerRegistry>,
    pub transform_registry: Arc<TransformRegistry>,
    pub notifier: Arc<WebhookNotifier>,
}

impl Shared {
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let conn = connect(&config.redis_url).await?;
        let queue_backend = RedisQueueBackend::new(&config.redis_url).await?;
        Ok(Self {
            queue: Arc::new(TaskQueue::new(Arc::new(queue_backend), 120)),
            event_bus: EventBus::new(),
            account_repo: Arc::new(RedisAccountRepository::new(conn.clone())),
            asset_repo: Arc::new(RedisAssetRepository::new(conn.clone())),
            stats: Arc::new(RedisStatsSink::new(conn)),
            analyzer_registry: Arc::new(build_default_analyzer_registry()),
            transform_registry: Arc::new(build_default_transform_registry()),
            notifier: Arc::new(WebhookNotifier::new()),
            config: Arc::new(config),
        })
    }

    /// Build the rate limiter and API log ring, the two pieces only the
    /// API server (not the worker) needs.
    pub async fn rate_limiting(&self) -> anyhow::Result<(Arc<RateLimiter<RedisRateLimitBackend>>, Arc<ApiLogRing>)> {
        let conn = connect(&self.config.redis_url).await?;
        let limiter = RateLimiter::new(RedisRateLimitBackend::new(conn), self.config.api_rate_limit_per_second);
        Ok((Arc::new(limiter), Arc::new(ApiLogRing::new(self.config.api_max_log_entries))))
    }
}

async fn connect(redis_url: &str) -> anyhow::Result<MultiplexedConnection> {
    let client = redis::Client::open(redis_url)?;
    Ok(client.get_multiplexed_async_connection().await?)
}
