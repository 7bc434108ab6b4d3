use std::time::Duration;

use anyhow::Result;
use safarai_api::{build_router, build_state, ApiConfig};
use safarai_observability::init_tracing;
use safarai_storage::SessionRepository;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("safarai_api");

    let config = ApiConfig::from_env();
    let bind = config.bind.clone();
    let state = build_state(config).await?;

    let maintenance = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            match maintenance.store.purge_expired(chrono::Utc::now()).await {
                Ok(purged) if purged > 0 => tracing::info!(purged, "expired sessions purged"),
                Ok(_) => {}
                Err(error) => tracing::warn!(error = %error, "session purge failed"),
            }
            let idle = maintenance.limiter.prune() + maintenance.auth_limiter.prune();
            tracing::debug!(idle_keys = idle, "rate limiter pruned");
        }
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "safarai api started");

    axum::serve(listener, app).await?;
    Ok(())
}
