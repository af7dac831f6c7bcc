use redis::Client;
use redis::aio::ConnectionManager;

/// Open a Redis connection manager and check it answers `PING`.
///
/// Only the scheduler uses Redis, for dispatch leases, and only when
/// `REDIS_URL` is configured.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;

    let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
    if pong != "PONG" {
        anyhow::bail!("Unexpected PING reply from Redis: {}", pong);
    }

    tracing::info!("Connected to Redis");
    Ok(manager)
}
