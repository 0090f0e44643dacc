//! `h51-api`: the HTTP front-end, backed by Redis for the queue, rate
//! limiter, account/asset stores, and stat counters.

use clap::Parser;
use h51::api::{build_router, AppState};
use h51::bootstrap::Shared;
use h51::config::Config;

#[derive(Parser)]
#[command(name = "h51-api")]
#[command(about = "Asset-processing HTTP API server")]
struct Cli {
    /// Override the bind address (`H51_BIND_ADDR`/config default otherwise).
    #[arg(long, env = "H51_BIND_ADDR")]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    h51::telemetry::init();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }
    let bind_addr = config.bind_addr.clone();

    let shared = Shared::connect(config).await?;
    let (rate_limiter, api_log) = shared.rate_limiting().await?;

    let state = AppState {
        config: shared.config,
        queue: shared.queue,
        event_bus: shared.event_bus,
        account_repo: shared.account_repo,
        asset_repo: shared.asset_repo,
        stats: shared.stats,
        rate_limiter,
        api_log,
        analyzer_registry: shared.analyzer_registry,
        transform_registry: shared.transform_registry,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "h51-api listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
    Ok(())
}
