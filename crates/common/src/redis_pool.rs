use redis::Client;
use redis::aio::ConnectionManager;

/// Connect the Redis manager that backs the distributed job lock.
///
/// Issues a `PING` so a bad `REDIS_URL` fails at startup rather than on the
/// first scheduled pass.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;

    let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
    tracing::info!(reply = %pong, "Connected to Redis (job locks)");
    Ok(manager)
}
