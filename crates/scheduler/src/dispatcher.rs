//! Dispatcher — one poll cycle of the delivery scheduler.
//!
//! Each cycle:
//! 1. Selects every message with `sent = false` and `due_at <= now`
//! 2. For each message (up to `max_concurrency` at a time):
//!    a. Resolves recipients; unknown ids are recorded as failed
//!    b. Sends the body and located attachments to every resolved address
//!    c. Aggregates per-recipient outcomes into a `DispatchReport`
//!    d. Commits `sent = true` together with the outcomes
//!
//! A message whose recipients all failed is still committed as sent: failed
//! recipients are never retried. Only an error before the commit (directory
//! unavailable, commit failed) leaves the message unsent, and it is then
//! selected and dispatched again in the next cycle.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt};

use herald_common::attachments::AttachmentStore;
use herald_common::error::AppError;
use herald_common::types::{DispatchReport, ScheduledMessage};
use herald_notifier::Notifier;

use crate::directory::RecipientDirectory;
use crate::lease::DispatchClaim;
use crate::resolver::{DeliveryResolver, unique_in_order};
use crate::store::MessageStore;

/// What happened to one selected message during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageResult {
    /// Dispatched and committed as sent.
    Sent(DispatchReport),
    /// Dispatched, but the store reported it already sent or deleted.
    AlreadyFinalized,
    /// Claimed by another worker; left for it.
    Skipped,
    /// Processing failed before commit; stays unsent for the next cycle.
    Failed(String),
}

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub selected: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    resolver: DeliveryResolver,
    notifier: Arc<dyn Notifier>,
    attachments: AttachmentStore,
    lease: Option<Arc<dyn DispatchClaim>>,
    max_concurrency: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn RecipientDirectory>,
        notifier: Arc<dyn Notifier>,
        attachments: AttachmentStore,
    ) -> Self {
        Self {
            store,
            resolver: DeliveryResolver::new(directory),
            notifier,
            attachments,
            lease: None,
            max_concurrency: 1,
        }
    }

    /// Number of messages dispatched concurrently within a cycle (minimum 1).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Claim each message through `lease` before dispatching it.
    pub fn with_lease(mut self, lease: impl DispatchClaim + 'static) -> Self {
        self.lease = Some(Arc::new(lease));
        self
    }

    /// Run one poll cycle against the store as of `now`.
    ///
    /// Only a failing selection query is returned as an error; failures of
    /// individual messages are logged and counted.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary, AppError> {
        let due = self.store.find_due_unsent(now).await?;
        let mut summary = CycleSummary {
            selected: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            tracing::debug!("No due messages");
            return Ok(summary);
        }
        tracing::info!(count = due.len(), "Processing due messages");

        let results: Vec<MessageResult> = futures::stream::iter(due)
            .map(|message| self.process(message))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for result in results {
            match result {
                MessageResult::Sent(_) => summary.sent += 1,
                MessageResult::AlreadyFinalized | MessageResult::Skipped => summary.skipped += 1,
                MessageResult::Failed(_) => summary.failed += 1,
            }
        }

        Ok(summary)
    }

    /// Claim, dispatch and commit one message. Never panics or propagates.
    pub async fn process(&self, message: ScheduledMessage) -> MessageResult {
        let message_id = message.id;

        if let Some(lease) = &self.lease {
            match lease.try_acquire(message_id).await {
                Ok(true) => {}
                Ok(false) => return MessageResult::Skipped,
                Err(e) => {
                    tracing::error!(message_id = %message_id, error = %e, "Failed to claim message");
                    return MessageResult::Failed(e.to_string());
                }
            }
        }

        let outcome = AssertUnwindSafe(self.dispatch_and_commit(&message))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::Internal("dispatch panicked".to_string())));

        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    message_id = %message_id,
                    error = %e,
                    "Error processing message, will retry next cycle"
                );
                if let Some(lease) = &self.lease
                    && let Err(release_err) = lease.release(message_id).await
                {
                    tracing::warn!(
                        message_id = %message_id,
                        error = %release_err,
                        "Failed to release dispatch lease"
                    );
                }
                MessageResult::Failed(e.to_string())
            }
        }
    }

    async fn dispatch_and_commit(
        &self,
        message: &ScheduledMessage,
    ) -> Result<MessageResult, AppError> {
        let report = self.dispatch(message).await?;

        let success = report.success();
        let failed = report.failed();
        if !success.is_empty() {
            tracing::info!(message_id = %message.id, recipients = ?success, "Delivered");
        }
        if !failed.is_empty() {
            tracing::warn!(message_id = %message.id, recipients = ?failed, "Delivery failed");
        }

        if self.store.mark_sent(message.id, &report).await? {
            tracing::info!(
                message_id = %message.id,
                success = success.len(),
                failed = failed.len(),
                "Message marked as sent"
            );
            Ok(MessageResult::Sent(report))
        } else {
            tracing::warn!(
                message_id = %message.id,
                "Message was already sent or deleted during dispatch"
            );
            Ok(MessageResult::AlreadyFinalized)
        }
    }

    /// Resolve and send to every recipient of `message`, without committing.
    pub async fn dispatch(&self, message: &ScheduledMessage) -> Result<DispatchReport, AppError> {
        let mut report = DispatchReport::new(message.id, Utc::now());
        let resolution = self.resolver.resolve(&message.recipients).await?;
        let attachments = self.locate_attachments(message).await;

        let sends = resolution.resolved.iter().map(|(recipient_id, address)| {
            let attachments = &attachments;
            async move {
                let result = self.notifier.send(address, &message.body, attachments).await;
                (recipient_id.as_str(), result)
            }
        });
        let mut results: HashMap<&str, _> = futures::future::join_all(sends)
            .await
            .into_iter()
            .collect();

        for recipient_id in unique_in_order(&message.recipients) {
            if resolution.unresolved.contains(recipient_id) {
                report.record_failure(recipient_id, "recipient not found");
                continue;
            }
            match results.remove(recipient_id) {
                Some(Ok(())) => report.record_success(recipient_id),
                Some(Err(e)) => {
                    tracing::warn!(
                        message_id = %message.id,
                        recipient_id = %recipient_id,
                        error = %e,
                        "Notifier failed for recipient"
                    );
                    report.record_failure(recipient_id, e.to_string());
                }
                None => report.record_failure(recipient_id, "no delivery attempted"),
            }
        }

        Ok(report)
    }

    async fn locate_attachments(&self, message: &ScheduledMessage) -> Vec<PathBuf> {
        let mut located = Vec::with_capacity(message.attachments.len());
        for reference in &message.attachments {
            match self.attachments.locate(reference).await {
                Some(path) => located.push(path),
                None => tracing::warn!(
                    message_id = %message.id,
                    attachment = %reference,
                    "Attachment file not found, skipping"
                ),
            }
        }
        located
    }
}
