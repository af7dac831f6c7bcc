//! Shared application state for the Axum API server.

use sqlx::PgPool;

use herald_common::attachments::AttachmentStore;
use herald_scheduler::directory::PgRecipientDirectory;
use herald_scheduler::store::PgMessageStore;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub messages: PgMessageStore,
    pub directory: PgRecipientDirectory,
    pub attachments: AttachmentStore,
}

impl AppState {
    pub fn new(pool: PgPool, attachments: AttachmentStore) -> Self {
        Self {
            messages: PgMessageStore::new(pool.clone()),
            directory: PgRecipientDirectory::new(pool.clone()),
            pool,
            attachments,
        }
    }
}
