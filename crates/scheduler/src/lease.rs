//! Dispatch lease — Redis-backed per-message claim.
//!
//! Before a message is dispatched the worker claims it with `SET NX EX`.
//! While the key exists no other worker or scheduler instance dispatches the
//! same message. The key is left to expire after a successful commit, and is
//! released early when the commit fails so the next cycle can retry.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use herald_common::error::AppError;

/// Deletes the key only if this owner still holds it.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Exclusive per-message claim taken before a dispatch.
#[async_trait]
pub trait DispatchClaim: Send + Sync {
    /// Try to claim `message_id`. Returns `false` if someone else holds it.
    async fn try_acquire(&self, message_id: Uuid) -> Result<bool, AppError>;

    /// Give up a claim held by this owner. A claim held by anyone else is left alone.
    async fn release(&self, message_id: Uuid) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct DispatchLease {
    redis: ConnectionManager,
    owner: String,
    ttl_secs: u64,
}

impl DispatchLease {
    /// Create a lease client with a fresh owner token for this process.
    pub fn new(redis: ConnectionManager, ttl_secs: u64) -> Self {
        Self {
            redis,
            owner: Uuid::new_v4().to_string(),
            ttl_secs: ttl_secs.max(1),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
impl DispatchClaim for DispatchLease {
    async fn try_acquire(&self, message_id: Uuid) -> Result<bool, AppError> {
        let mut redis = self.redis.clone();

        // SET key owner NX EX ttl → "OK" when claimed, nil when already held
        let result: Option<String> = redis::cmd("SET")
            .arg(lease_key(message_id))
            .arg(&self.owner)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut redis)
            .await?;

        let acquired = result.is_some();
        if !acquired {
            tracing::debug!(message_id = %message_id, "Message claimed by another worker");
        }

        Ok(acquired)
    }

    async fn release(&self, message_id: Uuid) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(lease_key(message_id))
            .arg(&self.owner)
            .invoke_async(&mut redis)
            .await?;
        Ok(())
    }
}

fn lease_key(message_id: Uuid) -> String {
    format!("dispatch:claim:{}", message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            lease_key(id),
            "dispatch:claim:00000000-0000-0000-0000-000000000000"
        );
    }
}
