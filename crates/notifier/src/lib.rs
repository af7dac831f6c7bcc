//! Outbound message delivery.
//!
//! A `Notifier` sends one text message plus zero or more files to a single
//! provider address. It reports success or failure per call; retrying is the
//! caller's decision.

pub mod telegram;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use telegram::TelegramNotifier;

/// Errors reported by a notifier for a single send call.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability to deliver a message to one provider address.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text` to `address`, followed by each file in `attachments`.
    ///
    /// `attachments` are paths that existed when the dispatch began. The
    /// returned error describes the text delivery; attachment problems are
    /// implementation-defined.
    async fn send(
        &self,
        address: &str,
        text: &str,
        attachments: &[PathBuf],
    ) -> Result<(), NotifyError>;
}
