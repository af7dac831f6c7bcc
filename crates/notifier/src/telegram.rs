//! Telegram Bot API notifier.
//!
//! Sends the text with `sendMessage`, then uploads each attachment with
//! `sendDocument`. A failed upload is logged and skipped; only the text
//! decides whether the recipient counts as delivered.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::{Notifier, NotifyError};

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Notifier backed by a Telegram bot.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramNotifier {
    /// Create a notifier. `timeout` bounds every individual HTTP call.
    pub fn new(
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        Self::check(response).await
    }

    async fn send_document(&self, chat_id: &str, path: &Path) -> Result<(), NotifyError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("attachment")
            .to_string();
        // The file is held only for the duration of this upload.
        let bytes = tokio::fs::read(path).await?;

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;

        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<(), NotifyError> {
        let status = response.status();
        let body: ApiResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(NotifyError::Rejected(format!("HTTP {}", status)));
            }
            Err(e) => return Err(e.into()),
        };

        if !body.ok {
            return Err(NotifyError::Rejected(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        address: &str,
        text: &str,
        attachments: &[PathBuf],
    ) -> Result<(), NotifyError> {
        if address.trim().is_empty() {
            return Err(NotifyError::InvalidAddress(address.to_string()));
        }

        self.send_text(address, text).await?;
        tracing::info!(chat_id = %address, "Message sent");

        for path in attachments {
            match self.send_document(address, path).await {
                Ok(()) => {
                    tracing::info!(chat_id = %address, file = %path.display(), "File sent");
                }
                Err(e) => {
                    tracing::error!(
                        chat_id = %address,
                        file = %path.display(),
                        error = %e,
                        "Failed to send file"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(base: &str) -> TelegramNotifier {
        TelegramNotifier::new("123:abc", base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_api_url() {
        let n = notifier("https://api.telegram.org");
        assert_eq!(
            n.api_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let n = notifier("http://localhost:8081/");
        assert_eq!(
            n.api_url("sendDocument"),
            "http://localhost:8081/bot123:abc/sendDocument"
        );
    }

    #[tokio::test]
    async fn test_empty_address_is_rejected_without_request() {
        // Unroutable base: a request would fail with Http, not InvalidAddress.
        let n = notifier("http://127.0.0.1:9");
        let result = n.send("  ", "hello", &[]).await;
        assert!(matches!(result, Err(NotifyError::InvalidAddress(_))));
    }

    #[test]
    fn test_api_response_parses_error_description() {
        let body: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();
        assert!(!body.ok);
        assert_eq!(
            body.description.as_deref(),
            Some("Bad Request: chat not found")
        );
    }
}
