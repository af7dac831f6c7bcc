use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Redis connection string. When set, the scheduler claims each message
    /// with a Redis lease before dispatching it.
    pub redis_url: Option<String>,

    /// Scheduler poll interval in milliseconds (default: 5000)
    pub scheduler_poll_interval_ms: u64,

    /// Messages dispatched concurrently within one poll cycle (default: 4)
    pub scheduler_max_concurrency: usize,

    /// TTL of a dispatch lease in seconds (default: 300). Must exceed
    /// `notifier_timeout_secs`; see `check_claim_ttl`.
    pub scheduler_claim_ttl_secs: u64,

    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// Telegram Bot API base URL
    pub telegram_api_base: String,

    /// Per-call timeout for outbound notifier requests, in seconds (default: 30)
    pub notifier_timeout_secs: u64,

    /// Directory holding uploaded attachment files
    pub upload_dir: String,

    /// Listen address of the HTTP API
    pub api_bind_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let scheduler_max_concurrency: usize = std::env::var("SCHEDULER_MAX_CONCURRENCY")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("SCHEDULER_MAX_CONCURRENCY must be a valid usize"))?;
        if scheduler_max_concurrency == 0 {
            anyhow::bail!("SCHEDULER_MAX_CONCURRENCY must be at least 1");
        }

        let scheduler_claim_ttl_secs: u64 = std::env::var("SCHEDULER_CLAIM_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("SCHEDULER_CLAIM_TTL_SECS must be a valid u64"))?;
        let notifier_timeout_secs: u64 = std::env::var("NOTIFIER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("NOTIFIER_TIMEOUT_SECS must be a valid u64"))?;
        check_claim_ttl(scheduler_claim_ttl_secs, notifier_timeout_secs)?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            scheduler_poll_interval_ms: std::env::var("SCHEDULER_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULER_POLL_INTERVAL_MS must be a valid u64"))?,
            scheduler_max_concurrency,
            scheduler_claim_ttl_secs,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_api_base: std::env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            notifier_timeout_secs,
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
        })
    }
}

/// Reject a dispatch lease TTL that a single notifier call can outlive.
///
/// A recipient's text and each of its attachments are separate calls, each
/// bounded by `notifier_timeout_secs`, so a message with `n` attachments can
/// take up to `(n + 1) * notifier_timeout_secs`. Once that exceeds the TTL a
/// second instance may claim and resend the message. Only the single-call
/// bound is enforced here; size the TTL for the largest expected attachment
/// count.
pub fn check_claim_ttl(claim_ttl_secs: u64, notifier_timeout_secs: u64) -> anyhow::Result<()> {
    if claim_ttl_secs <= notifier_timeout_secs {
        anyhow::bail!(
            "SCHEDULER_CLAIM_TTL_SECS ({}) must be greater than NOTIFIER_TIMEOUT_SECS ({})",
            claim_ttl_secs,
            notifier_timeout_secs
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_ttl_must_exceed_notifier_timeout() {
        assert!(check_claim_ttl(300, 30).is_ok());
        assert!(check_claim_ttl(30, 30).is_err());
        assert!(check_claim_ttl(10, 30).is_err());
    }
}
