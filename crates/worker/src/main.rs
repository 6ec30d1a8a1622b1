use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use feed_common::config::AppConfig;
use feed_common::db;
use feed_common::redis_pool::create_redis_pool;
use feed_engine::{PgQueueStore, QueueDrainer, RedisJobLock, RetentionSweeper};
use feed_host::HttpHostClient;
use feed_worker::scheduler::{run_drain_loop, run_sweep_loop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_worker=info,feed_engine=info,feed_host=info".into()),
        )
        .json()
        .init();

    tracing::info!("Course activity feed worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let redis = create_redis_pool(&config.redis_url).await?;

    if !config.blacklist_course_ids.is_empty() {
        tracing::warn!(
            course_ids = ?config.blacklist_course_ids,
            "BLACKLIST_COURSE_IDS is set but no job filters on it"
        );
    }
    if config.retention_delay_secs == 0 {
        tracing::info!("RETENTION_DELAY_SECS = 0, sent notifications are kept forever");
    }

    let store = Arc::new(PgQueueStore::new(pool));
    let host = Arc::new(HttpHostClient::from_config(&config)?);
    let lock = Arc::new(RedisJobLock::new(redis));
    let lock_ttl = Duration::from_secs(config.job_lock_ttl_secs);

    let drainer = Arc::new(QueueDrainer::new(
        store.clone(),
        host.clone(),
        host,
        lock.clone(),
        lock_ttl,
    ));
    let sweeper = Arc::new(RetentionSweeper::new(
        store,
        lock,
        lock_ttl,
        config.retention_delay_secs,
    ));

    let cancel = CancellationToken::new();

    let drain_task = tokio::spawn(run_drain_loop(
        drainer,
        Duration::from_secs(config.drain_interval_secs.max(1)),
        cancel.clone(),
    ));
    let sweep_task = tokio::spawn(run_sweep_loop(
        sweeper,
        Duration::from_secs(config.sweep_interval_secs.max(1)),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, finishing current passes...");
    cancel.cancel();

    let (drain, sweep) = tokio::join!(drain_task, sweep_task);
    drain?;
    sweep?;

    tracing::info!("Course activity feed worker stopped.");
    Ok(())
}
