//! Durable table of scheduled messages.
//!
//! The store exclusively owns `ScheduledMessage` records. The scheduler only
//! holds a copy for the duration of one dispatch cycle and commits the result
//! through `mark_sent`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    DeliveryOutcome, DispatchReport, MessageFilter, MessageStatus, NewMessage, ScheduledMessage,
};

/// Persistence contract for scheduled messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new, unsent message.
    async fn insert_message(&self, message: NewMessage) -> Result<ScheduledMessage, AppError>;

    /// All messages with `sent = false` and `due_at <= now`, in no particular order.
    async fn find_due_unsent(&self, now: DateTime<Utc>)
    -> Result<Vec<ScheduledMessage>, AppError>;

    /// Record the per-recipient outcomes and flip `sent` to true, atomically.
    ///
    /// Returns `false` when the message was already sent or no longer exists;
    /// nothing is written in that case. Once this returns `Ok(true)` the flag
    /// is durable.
    async fn mark_sent(&self, id: Uuid, report: &DispatchReport) -> Result<bool, AppError>;

    async fn get_message(&self, id: Uuid) -> Result<Option<ScheduledMessage>, AppError>;

    /// Messages matching `filter`, ordered by `due_at`.
    async fn list_messages(&self, filter: &MessageFilter)
    -> Result<Vec<ScheduledMessage>, AppError>;

    /// Delete a message. Returns true if it existed.
    async fn delete_message(&self, id: Uuid) -> Result<bool, AppError>;

    /// Per-recipient outcomes recorded by the dispatch of `id`.
    async fn outcomes(&self, id: Uuid) -> Result<Vec<DeliveryOutcome>, AppError>;
}

/// PostgreSQL-backed message store.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert_message(&self, message: NewMessage) -> Result<ScheduledMessage, AppError> {
        let stored: ScheduledMessage = sqlx::query_as(
            r#"
            INSERT INTO scheduled_messages (id, sender, recipients, body, due_at, attachments, sent)
            VALUES ($1, $2, $3, $4, $5, $6, false)
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(&message.sender)
        .bind(&message.recipients)
        .bind(&message.body)
        .bind(message.due_at)
        .bind(&message.attachments)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            message_id = %stored.id,
            sender = %stored.sender,
            recipients = stored.recipients.len(),
            due_at = %stored.due_at,
            "Message scheduled"
        );

        Ok(stored)
    }

    async fn find_due_unsent(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, AppError> {
        let due: Vec<ScheduledMessage> = sqlx::query_as(
            "SELECT * FROM scheduled_messages WHERE sent = false AND due_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(due)
    }

    async fn mark_sent(&self, id: Uuid, report: &DispatchReport) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        // Conditional update: a message transitions to sent at most once.
        let updated = sqlx::query(
            "UPDATE scheduled_messages SET sent = true, sent_at = NOW() WHERE id = $1 AND sent = false",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for outcome in &report.outcomes {
            sqlx::query(
                r#"
                INSERT INTO delivery_outcomes (message_id, recipient_id, status, error_detail, attempted_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (message_id, recipient_id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(&outcome.recipient_id)
            .bind(outcome.status.to_string())
            .bind(&outcome.error_detail)
            .bind(report.attempted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<ScheduledMessage>, AppError> {
        let message: Option<ScheduledMessage> =
            sqlx::query_as("SELECT * FROM scheduled_messages WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        filter: &MessageFilter,
    ) -> Result<Vec<ScheduledMessage>, AppError> {
        let sent = filter.status.map(|s| s == MessageStatus::Sent);

        let messages: Vec<ScheduledMessage> = sqlx::query_as(
            r#"
            SELECT * FROM scheduled_messages
            WHERE ($1::text IS NULL OR sender = $1)
              AND ($2::bool IS NULL OR sent = $2)
              AND ($3::timestamptz IS NULL OR due_at <= $3)
            ORDER BY due_at ASC, created_at ASC
            "#,
        )
        .bind(&filter.sender)
        .bind(sent)
        .bind(filter.due_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM scheduled_messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(message_id = %id, "Message deleted");
        }

        Ok(deleted)
    }

    async fn outcomes(&self, id: Uuid) -> Result<Vec<DeliveryOutcome>, AppError> {
        let outcomes: Vec<DeliveryOutcome> = sqlx::query_as(
            "SELECT * FROM delivery_outcomes WHERE message_id = $1 ORDER BY recipient_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(outcomes)
    }
}
