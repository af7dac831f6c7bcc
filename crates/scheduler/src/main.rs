use std::sync::Arc;
use std::time::Duration;

use herald_common::attachments::AttachmentStore;
use herald_common::config::AppConfig;
use herald_common::db;
use herald_common::redis_pool::create_redis_pool;
use herald_notifier::TelegramNotifier;
use herald_scheduler::directory::PgRecipientDirectory;
use herald_scheduler::dispatcher::Dispatcher;
use herald_scheduler::lease::DispatchLease;
use herald_scheduler::service::Scheduler;
use herald_scheduler::store::PgMessageStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_scheduler=info,herald_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald scheduler starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let bot_token = config
        .telegram_bot_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required"))?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let notifier = TelegramNotifier::new(
        bot_token,
        config.telegram_api_base.clone(),
        Duration::from_secs(config.notifier_timeout_secs),
    )?;

    let mut dispatcher = Dispatcher::new(
        Arc::new(PgMessageStore::new(pool.clone())),
        Arc::new(PgRecipientDirectory::new(pool)),
        Arc::new(notifier),
        AttachmentStore::new(&config.upload_dir),
    )
    .with_max_concurrency(config.scheduler_max_concurrency);

    if let Some(redis_url) = &config.redis_url {
        let redis = create_redis_pool(redis_url).await?;
        let lease = DispatchLease::new(redis, config.scheduler_claim_ttl_secs);
        tracing::info!(owner = %lease.owner(), "Dispatch lease enabled");
        dispatcher = dispatcher.with_lease(lease);
    } else {
        tracing::warn!("REDIS_URL not set, running without dispatch lease (single instance only)");
    }

    let handle = Scheduler::new(
        dispatcher,
        Duration::from_millis(config.scheduler_poll_interval_ms),
    )
    .start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    handle.stop().await?;

    tracing::info!("Herald scheduler stopped.");
    Ok(())
}
