//! Attachment file storage.
//!
//! Uploaded files live on disk under a single root directory, outside the
//! database. A message stores only the file name (its "reference"); the
//! scheduler turns references back into paths right before dispatch.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::AppError;

/// Largest file the Telegram Bot API accepts for `sendDocument`.
pub const DEFAULT_MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

/// Root-directory file store for message attachments.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
    max_file_bytes: usize,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an uploaded file and return its stored reference.
    ///
    /// The file is named `<message_id>_<uuid><ext>`, keeping only the
    /// extension of the caller's file name.
    pub async fn save(
        &self,
        message_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, AppError> {
        if bytes.len() > self.max_file_bytes {
            return Err(AppError::Validation(format!(
                "Attachment '{}' is {} bytes, limit is {}",
                original_name,
                bytes.len(),
                self.max_file_bytes
            )));
        }
        tokio::fs::create_dir_all(&self.root).await?;

        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let reference = format!("{}_{}{}", message_id, Uuid::new_v4(), extension);

        tokio::fs::write(self.root.join(&reference), bytes).await?;
        tracing::debug!(message_id = %message_id, reference = %reference, "Attachment stored");

        Ok(reference)
    }

    /// Save every file or none of them.
    ///
    /// If any save fails, files already written by this call are removed
    /// before the error is returned.
    pub async fn save_all(
        &self,
        message_id: Uuid,
        files: &[(String, Vec<u8>)],
    ) -> Result<Vec<String>, AppError> {
        let mut references = Vec::with_capacity(files.len());
        for (file_name, bytes) in files {
            match self.save(message_id, file_name, bytes).await {
                Ok(reference) => references.push(reference),
                Err(e) => {
                    self.remove_all(&references).await;
                    return Err(e);
                }
            }
        }
        Ok(references)
    }

    /// Best-effort removal of several stored files; failures are logged.
    pub async fn remove_all(&self, references: &[String]) {
        for reference in references {
            if let Err(e) = self.remove(reference).await {
                tracing::warn!(attachment = %reference, error = %e, "Failed to remove attachment");
            }
        }
    }

    /// Resolve a stored reference to an existing regular file.
    ///
    /// Returns `None` for missing files and for references that are not a
    /// single plain file name.
    pub async fn locate(&self, reference: &str) -> Option<PathBuf> {
        let mut components = Path::new(reference).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return None,
        }

        let path = self.root.join(reference);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, reference: &str) -> Result<(), AppError> {
        let Some(path) = self.locate(reference).await else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> AttachmentStore {
        AttachmentStore::new(std::env::temp_dir().join(format!("herald-test-{}", Uuid::new_v4())))
    }

    #[tokio::test]
    async fn test_save_then_locate() {
        let store = temp_store();
        let message_id = Uuid::new_v4();

        let reference = store.save(message_id, "report.pdf", b"%PDF").await.unwrap();
        assert!(reference.starts_with(&message_id.to_string()));
        assert!(reference.ends_with(".pdf"));

        let path = store.locate(&reference).await.unwrap();
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"%PDF");

        store.remove(&reference).await.unwrap();
        assert!(store.locate(&reference).await.is_none());

        tokio::fs::remove_dir_all(store.root()).await.ok();
    }

    #[tokio::test]
    async fn test_save_all_removes_earlier_files_on_failure() {
        let store = temp_store().with_max_file_bytes(4);
        let files = vec![
            ("first.txt".to_string(), b"ok".to_vec()),
            ("second.txt".to_string(), b"much too large".to_vec()),
        ];

        let result = store.save_all(Uuid::new_v4(), &files).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let mut entries = tokio::fs::read_dir(store.root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        tokio::fs::remove_dir_all(store.root()).await.ok();
    }

    #[tokio::test]
    async fn test_save_all_keeps_every_file() {
        let store = temp_store();
        let files = vec![
            ("a.txt".to_string(), b"a".to_vec()),
            ("b.txt".to_string(), b"b".to_vec()),
        ];

        let references = store.save_all(Uuid::new_v4(), &files).await.unwrap();
        assert_eq!(references.len(), 2);
        for reference in &references {
            assert!(store.locate(reference).await.is_some());
        }

        tokio::fs::remove_dir_all(store.root()).await.ok();
    }

    #[tokio::test]
    async fn test_locate_missing_file() {
        let store = temp_store();
        assert!(store.locate("nope.txt").await.is_none());
    }

    #[tokio::test]
    async fn test_locate_rejects_paths_outside_root() {
        let store = temp_store();
        assert!(store.locate("../etc/passwd").await.is_none());
        assert!(store.locate("/etc/passwd").await.is_none());
        assert!(store.locate("nested/file.txt").await.is_none());
    }

    #[tokio::test]
    async fn test_save_drops_odd_extension() {
        let store = temp_store();
        let reference = store
            .save(Uuid::new_v4(), "weird.t/x?t", b"x")
            .await
            .unwrap();
        assert!(!reference.contains('?'));

        tokio::fs::remove_dir_all(store.root()).await.ok();
    }
}
