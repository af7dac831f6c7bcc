//! Scheduled message routes.

use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    DeliveryOutcome, MessageFilter, MessageStatus, NewMessage, ScheduledMessage,
};
use herald_common::validate::{parse_due_at, parse_recipient_list};
use herald_scheduler::store::MessageStore;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/schedule-message", post(schedule_message))
        .route("/pending-messages", get(list_messages))
        .route("/delete-message", delete(delete_message))
        .route("/messages/{id}/outcomes", get(message_outcomes))
}

/// Status filter accepted by `GET /pending-messages`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusParam {
    Pending,
    Sent,
    #[default]
    All,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub from_sender: String,
    #[serde(default)]
    pub status: StatusParam,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub message_id: Uuid,
}

/// Form fields of a schedule request, collected from the multipart stream.
#[derive(Default)]
struct ScheduleForm {
    from_sender: Option<String>,
    target_user_id: Option<String>,
    message: Option<String>,
    scheduled_timestamp: Option<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl ScheduleForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "files" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid file upload: {}", e)))?;
                // Browsers send an empty, unnamed part when no file is chosen.
                if !file_name.is_empty() {
                    form.files.push((file_name, bytes.to_vec()));
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Invalid field '{}': {}", name, e)))?;
            match name.as_str() {
                "from_sender" => form.from_sender = Some(value),
                "target_user_id" => form.target_user_id = Some(value),
                "message" => form.message = Some(value),
                "scheduled_timestamp" => form.scheduled_timestamp = Some(value),
                _ => {}
            }
        }

        Ok(form)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value.ok_or_else(|| AppError::Validation(format!("Missing required field '{}'", field)))
}

/// POST /schedule-message — Schedule a message with optional file attachments.
///
/// Multipart fields: `from_sender`, `target_user_id` (comma-separated ids),
/// `message`, `scheduled_timestamp` (ISO-8601, UTC), and any number of `files`.
async fn schedule_message(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ScheduledMessage>, AppError> {
    let form = ScheduleForm::read(multipart).await?;

    // Validate everything before touching disk or database
    let sender = required(form.from_sender, "from_sender")?;
    let recipients = parse_recipient_list(&required(form.target_user_id, "target_user_id")?)?;
    let body = required(form.message, "message")?;
    let due_at = parse_due_at(&required(form.scheduled_timestamp, "scheduled_timestamp")?)?;
    let message = NewMessage::new(sender, recipients, body, due_at)?;

    // Either every file is stored or none is
    let references = state.attachments.save_all(message.id, &form.files).await?;

    match state
        .messages
        .insert_message(message.with_attachments(references.clone()))
        .await
    {
        Ok(stored) => Ok(Json(stored)),
        Err(e) => {
            state.attachments.remove_all(&references).await;
            Err(e)
        }
    }
}

/// GET /pending-messages — Messages scheduled by a sender, optionally filtered by status.
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ScheduledMessage>>, AppError> {
    let status = match query.status {
        StatusParam::Pending => Some(MessageStatus::Pending),
        StatusParam::Sent => Some(MessageStatus::Sent),
        StatusParam::All => None,
    };
    let filter = MessageFilter {
        sender: Some(query.from_sender),
        status,
        due_before: None,
    };

    let messages = state.messages.list_messages(&filter).await?;
    Ok(Json(messages))
}

/// DELETE /delete-message — Delete a scheduled message and its stored files.
async fn delete_message(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<bool>, AppError> {
    let message = state
        .messages
        .get_message(query.message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    if !state.messages.delete_message(message.id).await? {
        return Err(AppError::NotFound("Message not found".to_string()));
    }

    state.attachments.remove_all(&message.attachments).await;

    Ok(Json(true))
}

/// GET /messages/{id}/outcomes — Per-recipient results of a completed dispatch.
async fn message_outcomes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryOutcome>>, AppError> {
    if state.messages.get_message(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Message {} not found", id)));
    }

    let outcomes = state.messages.outcomes(id).await?;
    Ok(Json(outcomes))
}
