//! File records and uploads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::backend::{watch_query, Backend, Document, Query, Subscription, WriteBatch};
use crate::{ClassdropError, Result};

use super::ids::{blob_path, generate_record_id};
use super::{decode_all, now, validate_name};

/// Collection holding file documents.
pub const FILES: &str = "files";

/// Metadata for an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub class_code: String,
    pub folder_id: String,
    /// Display name.
    pub name: String,
    /// Retrieval URL handed out by the blob store.
    pub url: String,
    /// Blob store path.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub uploaded_at: DateTime<Utc>,
}

/// A local resource to upload.
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub source: PathBuf,
    pub name: String,
    pub mime_type: Option<String>,
}

impl UploadInput {
    pub fn new(source: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            name: name.into(),
            mime_type: None,
        }
    }

    /// Set the MIME type reported by the picker.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Content type to store: the given MIME type, else a guess from the name.
    fn content_type(&self) -> Option<String> {
        self.mime_type
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| {
                mime_guess::from_path(&self.name)
                    .first_raw()
                    .map(str::to_string)
            })
    }
}

/// Repository for file records and their blobs.
#[derive(Debug, Clone)]
pub struct FileRepository {
    backend: Backend,
}

impl FileRepository {
    /// Create a new FileRepository over the given backend.
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Upload a local resource into a folder.
    ///
    /// The content is written to the blob store first; the metadata record
    /// is only created once the blob and its URL exist. If either of those
    /// later steps fails, the stored blob is deleted again before the error
    /// is returned. Neither the class nor the folder is checked for existence.
    pub async fn upload(
        &self,
        class_code: &str,
        folder_id: &str,
        input: &UploadInput,
    ) -> Result<FileRecord> {
        let content = tokio::fs::read(&input.source).await?;
        let size = content.len();

        let id = generate_record_id();
        let path = blob_path(class_code, folder_id, &id, &input.name);
        let content_type = input.content_type();

        self.backend
            .blobs()
            .put(&path, content, content_type.as_deref())
            .await?;

        let mut record = FileRecord {
            id,
            class_code: class_code.to_string(),
            folder_id: folder_id.to_string(),
            name: input.name.clone(),
            url: String::new(),
            path,
            content_type,
            uploaded_at: now(),
        };
        if let Err(e) = self.store_record(&mut record).await {
            warn!(file_id = %record.id, "upload failed after storing blob: {e}");
            self.delete_blob(&record.path).await;
            return Err(e);
        }

        info!(
            class_code,
            folder_id,
            file_id = %record.id,
            size,
            "file uploaded"
        );
        Ok(record)
    }

    /// Resolve the retrieval URL and write the metadata record.
    async fn store_record(&self, record: &mut FileRecord) -> Result<()> {
        record.url = self.backend.blobs().download_url(&record.path).await?;
        let doc = Document::from_record(&record.id, &*record)?;
        self.backend.documents().set(FILES, &doc.id, doc.data).await
    }

    /// Get a file record by id.
    pub async fn get(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let doc = self.backend.documents().get(FILES, file_id).await?;
        doc.map(|d| d.decode()).transpose()
    }

    /// All file records of a class, in upload order.
    pub async fn list_by_class(&self, class_code: &str) -> Result<Vec<FileRecord>> {
        let docs = self.backend.documents().query(&by_class(class_code)).await?;
        Ok(decode_all(docs))
    }

    /// File records in one folder, in upload order.
    pub async fn list_by_folder(
        &self,
        class_code: &str,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>> {
        let query = by_class(class_code).where_eq("folderId", folder_id);
        let docs = self.backend.documents().query(&query).await?;
        Ok(decode_all(docs))
    }

    /// Watch all file records of a class, in upload order.
    pub fn watch_by_class(&self, class_code: &str) -> Subscription<Vec<FileRecord>> {
        watch_query(
            Arc::clone(self.backend.documents()),
            by_class(class_code),
            decode_all::<FileRecord>,
        )
    }

    /// Rename a file. Only the display name changes; the blob stays put.
    pub async fn rename(&self, file_id: &str, name: &str) -> Result<()> {
        let name = validate_name("file", name)?;

        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String(name));
        self.backend
            .documents()
            .update(FILES, file_id, fields)
            .await
            .map_err(|e| match e {
                ClassdropError::NotFound(_) => {
                    ClassdropError::NotFound(format!("file {file_id}"))
                }
                other => other,
            })?;

        info!(file_id, "file renamed");
        Ok(())
    }

    /// Delete a file: blob first, then the record.
    ///
    /// A failed blob deletion is logged and does not stop the record from
    /// being removed. Returns `false` if there was no such record.
    pub async fn delete(&self, file_id: &str) -> Result<bool> {
        let Some(record) = self.get(file_id).await? else {
            debug!(file_id, "delete on missing file");
            return Ok(false);
        };

        self.delete_blob(&record.path).await;
        let deleted = self.backend.documents().delete(FILES, file_id).await?;

        info!(file_id, "file deleted");
        Ok(deleted)
    }

    /// Delete every file in a folder. Returns the number of records removed.
    pub async fn delete_by_folder(&self, class_code: &str, folder_id: &str) -> Result<usize> {
        let files = self.list_by_folder(class_code, folder_id).await?;
        if files.is_empty() {
            return Ok(0);
        }

        join_all(files.iter().map(|f| self.delete_blob(&f.path))).await;

        let mut batch = WriteBatch::new();
        for file in &files {
            batch.delete(FILES, &file.id);
        }
        self.backend.documents().commit(batch).await?;

        debug!(class_code, folder_id, count = files.len(), "folder files deleted");
        Ok(files.len())
    }

    async fn delete_blob(&self, path: &str) {
        if path.is_empty() {
            return;
        }
        match self.backend.blobs().delete(path).await {
            Ok(true) => {}
            Ok(false) => debug!(path, "blob already gone"),
            Err(e) => warn!(path, "blob delete failed: {e}"),
        }
    }
}

fn by_class(class_code: &str) -> Query {
    Query::collection(FILES).where_eq("classCode", class_code)
}
