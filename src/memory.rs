//! In-memory repository and file store, used for dry runs and tests.

use crate::cms::{
    ContentId, ContentRepository, ContentResult, ContentWrite, FileInfo, FileStore, Subject,
    WriteStatus,
};
use crate::error::RepositoryError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct RecordedWrite {
    pub id: ContentId,
    pub subject: Subject,
    pub write: ContentWrite,
}

#[derive(Default)]
pub struct InMemoryRepository {
    external_ids: Mutex<HashMap<String, ContentId>>,
    rejected_types: Mutex<HashSet<String>>,
    writes: Mutex<Vec<RecordedWrite>>,
    next_id: AtomicU64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_external_id(self, external_id: &str, id: &str) -> Self {
        if let Ok(mut ids) = self.external_ids.lock() {
            ids.insert(external_id.to_string(), ContentId::new(id));
        }
        self
    }

    /// Makes every create of `content_type` come back with a failure status.
    pub fn rejecting(self, content_type: &str) -> Self {
        if let Ok(mut types) = self.rejected_types.lock() {
            types.insert(content_type.to_string());
        }
        self
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    pub fn writes_of_type(&self, content_type: &str) -> Vec<RecordedWrite> {
        self.writes()
            .into_iter()
            .filter(|recorded| recorded.write.content_type == content_type)
            .collect()
    }

    fn lock_error<T>(_: T) -> RepositoryError {
        RepositoryError::Backend("in-memory repository lock poisoned".to_string())
    }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn resolve(
        &self,
        external_id: &str,
        _subject: &Subject,
    ) -> Result<Option<ContentId>, RepositoryError> {
        let ids = self.external_ids.lock().map_err(Self::lock_error)?;
        Ok(ids.get(external_id).cloned())
    }

    async fn create(
        &self,
        write: ContentWrite,
        subject: &Subject,
    ) -> Result<ContentResult, RepositoryError> {
        let id = ContentId::new(format!(
            "onecms:{}",
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        ));
        let rejected = self
            .rejected_types
            .lock()
            .map_err(Self::lock_error)?
            .contains(&write.content_type);

        let status = if rejected {
            WriteStatus::Rejected {
                code: 500,
                message: format!("cannot store {}", write.content_type),
            }
        } else {
            self.writes.lock().map_err(Self::lock_error)?.push(RecordedWrite {
                id: id.clone(),
                subject: subject.clone(),
                write,
            });
            WriteStatus::Created
        };

        Ok(ContentResult { status, id })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedUpload {
    pub scheme: String,
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
    pub subject: Subject,
}

#[derive(Default)]
pub struct InMemoryFileStore {
    uploads: Mutex<Vec<RecordedUpload>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads
            .lock()
            .map(|uploads| uploads.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn upload_file(
        &self,
        scheme: &str,
        _parent: Option<&ContentId>,
        filename: &str,
        data: &[u8],
        mime_type: &str,
        subject: &Subject,
    ) -> Result<FileInfo, RepositoryError> {
        let mut uploads = self
            .uploads
            .lock()
            .map_err(|_| RepositoryError::Backend("in-memory file store lock poisoned".to_string()))?;
        uploads.push(RecordedUpload {
            scheme: scheme.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: data.len(),
            subject: subject.clone(),
        });

        let original_path = format!("{}/{}", uploads.len(), filename);
        Ok(FileInfo {
            uri: format!("{}://{}", scheme, original_path),
            original_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValueBag;

    #[tokio::test]
    async fn test_repository_records_writes() {
        let repository = InMemoryRepository::new().with_external_id("desk.level", "policy:2.1");
        let subject = Subject::default();

        assert_eq!(
            repository.resolve("desk.level", &subject).await.unwrap(),
            Some(ContentId::new("policy:2.1"))
        );
        assert_eq!(repository.resolve("missing", &subject).await.unwrap(), None);

        let result = repository
            .create(ContentWrite::new("atex.onecms.article", FieldValueBag::new()), &subject)
            .await
            .unwrap();
        assert!(result.status.is_ok());
        assert_eq!(result.id.as_str(), "onecms:1");
        assert_eq!(repository.writes_of_type("atex.onecms.article").len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_type() {
        let repository = InMemoryRepository::new().rejecting("atex.onecms.image");
        let result = repository
            .create(
                ContentWrite::new("atex.onecms.image", FieldValueBag::new()),
                &Subject::default(),
            )
            .await
            .unwrap();

        assert!(!result.status.is_ok());
        assert!(repository.writes().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_upload() {
        let store = InMemoryFileStore::new();
        let info = store
            .upload_file("tmp", None, "photo.jpg", &[1, 2, 3], "image/jpeg", &Subject::default())
            .await
            .unwrap();

        assert_eq!(info.original_path, "1/photo.jpg");
        assert_eq!(info.uri, "tmp://1/photo.jpg");
        assert_eq!(store.uploads()[0].size, 3);
    }
}
