//! Recipient subscription routes.
//!
//! Field names (`user_id`, `chat_id`, `chat_name`) are the ones the Telegram
//! bot sends and reads back.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::Recipient;
use herald_scheduler::directory::RecipientDirectory;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscribe-user", post(subscribe_user))
        .route("/subscribed-users", get(list_subscribed_users))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub chat_id: String,
    pub chat_name: String,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub user_id: Uuid,
    pub chat_id: String,
    pub chat_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Recipient> for SubscribeResponse {
    fn from(recipient: Recipient) -> Self {
        Self {
            user_id: recipient.id,
            chat_id: recipient.address,
            chat_name: recipient.display_name,
            created_at: recipient.created_at,
        }
    }
}

/// POST /subscribe-user — Register a chat and return its generated user id.
///
/// A chat that is already subscribed yields 409 Conflict.
async fn subscribe_user(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, AppError> {
    let recipient = state
        .directory
        .insert_recipient_if_absent(&req.chat_id, &req.chat_name)
        .await?;
    Ok(Json(recipient.into()))
}

/// GET /subscribed-users — List all subscribed recipients.
async fn list_subscribed_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubscribeResponse>>, AppError> {
    let recipients = state.directory.list_recipients().await?;
    Ok(Json(recipients.into_iter().map(Into::into).collect()))
}
