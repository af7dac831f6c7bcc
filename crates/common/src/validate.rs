//! Creation-time validation of caller input.
//!
//! Rejections here surface as `AppError::Validation` and happen before
//! anything is persisted.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::AppError;

/// Parse an ISO-8601 timestamp and normalize it to UTC.
///
/// Accepts a `Z` suffix or a numeric offset. A timestamp with no offset at
/// all is taken to already be UTC.
pub fn parse_due_at(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(AppError::Validation(format!(
        "Invalid timestamp format '{}': expected ISO-8601, e.g. 2025-01-31T09:00:00Z",
        raw
    )))
}

/// Split a comma-separated recipient list, dropping blank entries.
pub fn parse_recipient_list(raw: &str) -> Result<Vec<String>, AppError> {
    let recipients: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if recipients.is_empty() {
        return Err(AppError::Validation(
            "At least one recipient is required".to_string(),
        ));
    }
    Ok(recipients)
}
