//! Delivery resolver — turns recipient ids into provider addresses.
//!
//! Read-only: the directory is queried once per distinct id and nothing is
//! written. Ids the directory does not know end up in `unresolved`, and the
//! dispatcher never hands them to the notifier.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use herald_common::error::AppError;

use crate::directory::RecipientDirectory;

/// Result of resolving a recipient list.
///
/// Every distinct input id lands in exactly one of the two collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// recipient id → provider address
    pub resolved: HashMap<String, String>,
    pub unresolved: HashSet<String>,
}

#[derive(Clone)]
pub struct DeliveryResolver {
    directory: Arc<dyn RecipientDirectory>,
}

impl DeliveryResolver {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve `recipient_ids`, collapsing duplicates.
    ///
    /// A directory error aborts the whole resolution; "not found" is not an error.
    pub async fn resolve(&self, recipient_ids: &[String]) -> Result<Resolution, AppError> {
        let mut resolution = Resolution::default();

        for id in unique_in_order(recipient_ids) {
            match self.directory.find_recipient(id).await? {
                Some(recipient) => {
                    resolution.resolved.insert(id.to_string(), recipient.address);
                }
                None => {
                    tracing::warn!(recipient_id = %id, "No subscribed recipient found");
                    resolution.unresolved.insert(id.to_string());
                }
            }
        }

        Ok(resolution)
    }
}

/// Distinct ids, first occurrence wins.
pub(crate) fn unique_in_order(ids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}
