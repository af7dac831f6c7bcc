//! Recipient directory: maps recipient ids to provider addresses.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::Recipient;

/// Persistence contract for subscribed recipients.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Register a new recipient for `address`.
    ///
    /// Fails with `AppError::Conflict` if the address is already registered;
    /// the existing record is left untouched.
    async fn insert_recipient_if_absent(
        &self,
        address: &str,
        display_name: &str,
    ) -> Result<Recipient, AppError>;

    /// Look up a recipient by its opaque id. Unknown or malformed ids yield `None`.
    async fn find_recipient(&self, recipient_id: &str) -> Result<Option<Recipient>, AppError>;

    async fn list_recipients(&self) -> Result<Vec<Recipient>, AppError>;
}

/// PostgreSQL-backed recipient directory.
#[derive(Clone)]
pub struct PgRecipientDirectory {
    pool: PgPool,
}

impl PgRecipientDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientDirectory for PgRecipientDirectory {
    async fn insert_recipient_if_absent(
        &self,
        address: &str,
        display_name: &str,
    ) -> Result<Recipient, AppError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(AppError::Validation("address must not be empty".to_string()));
        }

        // ON CONFLICT keeps the uniqueness check and the insert in one statement.
        let inserted: Option<Recipient> = sqlx::query_as(
            r#"
            INSERT INTO recipients (id, address, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (address) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(address)
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await?;

        let recipient = inserted.ok_or_else(|| {
            AppError::Conflict(format!("Recipient with address {} already exists", address))
        })?;

        tracing::info!(
            recipient_id = %recipient.id,
            address = %recipient.address,
            "Recipient subscribed"
        );

        Ok(recipient)
    }

    async fn find_recipient(&self, recipient_id: &str) -> Result<Option<Recipient>, AppError> {
        let Ok(id) = Uuid::parse_str(recipient_id) else {
            return Ok(None);
        };

        let recipient: Option<Recipient> = sqlx::query_as("SELECT * FROM recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(recipient)
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>, AppError> {
        let recipients: Vec<Recipient> =
            sqlx::query_as("SELECT * FROM recipients ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(recipients)
    }
}
