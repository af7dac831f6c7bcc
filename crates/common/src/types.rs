use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Per-recipient delivery status recorded after a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle filter for message listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Not yet dispatched (`sent = false`), whether due or not.
    Pending,
    /// Dispatch attempt completed.
    Sent,
}

/// A registered delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipient {
    pub id: Uuid,
    /// Provider delivery address (Telegram chat id). Unique.
    pub address: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A message scheduled for delivery at or after `due_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub sender: String,
    /// Opaque recipient identifiers, in the order the caller gave them.
    pub recipients: Vec<String>,
    pub body: String,
    pub due_at: DateTime<Utc>,
    /// Stored attachment references (see `AttachmentStore`).
    pub attachments: Vec<String>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// A message is due once its time has come and it has not been dispatched.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.sent && self.due_at <= now
    }
}

/// Validated input for creating a `ScheduledMessage`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub sender: String,
    pub recipients: Vec<String>,
    pub body: String,
    pub due_at: DateTime<Utc>,
    pub attachments: Vec<String>,
}

impl NewMessage {
    /// Build a new message, rejecting an empty recipient list.
    ///
    /// The id is generated here so attachment files can be named after the
    /// message before it is persisted.
    pub fn new(
        sender: impl Into<String>,
        recipients: Vec<String>,
        body: impl Into<String>,
        due_at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let recipients: Vec<String> = recipients
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(AppError::Validation(
                "At least one recipient is required".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            recipients,
            body: body.into(),
            due_at,
            attachments: Vec::new(),
        })
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Query parameters for listing messages. `None` fields do not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageFilter {
    pub sender: Option<String>,
    pub status: Option<MessageStatus>,
    /// Only messages with `due_at <= due_before`.
    pub due_before: Option<DateTime<Utc>>,
}

impl MessageFilter {
    pub fn matches(&self, message: &ScheduledMessage) -> bool {
        if let Some(sender) = &self.sender
            && &message.sender != sender
        {
            return false;
        }
        match self.status {
            Some(MessageStatus::Pending) if message.sent => return false,
            Some(MessageStatus::Sent) if !message.sent => return false,
            _ => {}
        }
        if let Some(due_before) = self.due_before
            && message.due_at > due_before
        {
            return false;
        }
        true
    }
}

/// Persisted outcome of one recipient within one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryOutcome {
    pub message_id: Uuid,
    pub recipient_id: String,
    pub status: DeliveryStatus,
    pub error_detail: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Outcome of one recipient, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    pub recipient_id: String,
    pub status: DeliveryStatus,
    pub error_detail: Option<String>,
}

/// Aggregate result of one dispatch attempt for one message.
///
/// Each recipient id appears at most once, in the order the message lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub message_id: Uuid,
    pub attempted_at: DateTime<Utc>,
    pub outcomes: Vec<RecipientOutcome>,
}

impl DispatchReport {
    pub fn new(message_id: Uuid, attempted_at: DateTime<Utc>) -> Self {
        Self {
            message_id,
            attempted_at,
            outcomes: Vec::new(),
        }
    }

    pub fn record_success(&mut self, recipient_id: impl Into<String>) {
        self.outcomes.push(RecipientOutcome {
            recipient_id: recipient_id.into(),
            status: DeliveryStatus::Sent,
            error_detail: None,
        });
    }

    pub fn record_failure(&mut self, recipient_id: impl Into<String>, reason: impl Into<String>) {
        self.outcomes.push(RecipientOutcome {
            recipient_id: recipient_id.into(),
            status: DeliveryStatus::Failed,
            error_detail: Some(reason.into()),
        });
    }

    /// Recipient ids delivered successfully.
    pub fn success(&self) -> Vec<&str> {
        self.ids_with(DeliveryStatus::Sent)
    }

    /// Recipient ids that could not be resolved or whose send failed.
    pub fn failed(&self) -> Vec<&str> {
        self.ids_with(DeliveryStatus::Failed)
    }

    fn ids_with(&self, status: DeliveryStatus) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == status)
            .map(|o| o.recipient_id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(sent: bool, due_in_secs: i64) -> ScheduledMessage {
        let now = Utc::now();
        ScheduledMessage {
            id: Uuid::new_v4(),
            sender: "ops".to_string(),
            recipients: vec!["r1".to_string()],
            body: "hello".to_string(),
            due_at: now + Duration::seconds(due_in_secs),
            attachments: vec![],
            sent,
            sent_at: None,
            created_at: now,
        }
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(message(false, -1).is_due(now));
        assert!(!message(false, 60).is_due(now));
        assert!(!message(true, -1).is_due(now));
    }

    #[test]
    fn test_new_message_rejects_empty_recipients() {
        let result = NewMessage::new("ops", vec![], "hi", Utc::now());
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = NewMessage::new("ops", vec!["  ".to_string()], "hi", Utc::now());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_filter_matches() {
        let pending = message(false, 60);
        let sent = message(true, -60);

        let by_status = MessageFilter {
            status: Some(MessageStatus::Pending),
            ..Default::default()
        };
        assert!(by_status.matches(&pending));
        assert!(!by_status.matches(&sent));

        let by_sender = MessageFilter {
            sender: Some("someone-else".to_string()),
            ..Default::default()
        };
        assert!(!by_sender.matches(&pending));

        let due = MessageFilter {
            due_before: Some(Utc::now()),
            ..Default::default()
        };
        assert!(!due.matches(&pending));
        assert!(due.matches(&sent));
    }

    #[test]
    fn test_report_partitions_outcomes() {
        let mut report = DispatchReport::new(Uuid::new_v4(), Utc::now());
        report.record_success("r1");
        report.record_failure("r2", "not subscribed");
        report.record_success("r3");

        assert_eq!(report.success(), vec!["r1", "r3"]);
        assert_eq!(report.failed(), vec!["r2"]);
        assert_eq!(
            report.outcomes[1].error_detail.as_deref(),
            Some("not subscribed")
        );
    }
}
