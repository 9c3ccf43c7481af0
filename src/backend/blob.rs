//! Blob store trait.

use async_trait::async_trait;

use crate::Result;

/// Object storage addressed by slash-separated relative paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` at `path`, replacing any existing object.
    async fn put(&self, path: &str, content: Vec<u8>, content_type: Option<&str>) -> Result<()>;

    /// Get the retrieval URL of a stored object.
    async fn download_url(&self, path: &str) -> Result<String>;

    /// Delete the object at `path`.
    ///
    /// Returns `true` if the object was deleted, `false` if it didn't exist.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Check whether an object exists.
    async fn exists(&self, path: &str) -> Result<bool>;
}
