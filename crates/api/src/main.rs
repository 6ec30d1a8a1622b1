//! Course activity feed ingest API binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use feed_common::config::AppConfig;
use feed_common::db::{create_pool, run_migrations};
use feed_engine::PgQueueStore;
use feed_host::HttpHostClient;

use feed_api::routes::create_router;
use feed_api::state::AppState;

/// Module events are small; anything larger is not a host event.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("feed_api=debug,feed_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting course activity feed API server...");

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    let store = Arc::new(PgQueueStore::new(pool));
    let directory = Arc::new(HttpHostClient::from_config(&config)?);
    let port = config.api_port;

    let state = AppState::new(store, directory, config);

    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    Ok(())
}
