//! Filesystem blob store.
//!
//! Objects are stored under a base directory at their relative path:
//! ```text
//! {base_path}/
//! └── ABC123/
//!     └── x7Kp2mQa9BcD/
//!         └── Lm3nPq8rSt2u-homework_1.pdf
//! ```

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use url::Url;

use super::blob::BlobStore;
use crate::{ClassdropError, Result};

/// Blob store writing objects to a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
    public_url: Option<Url>,
}

impl FsBlobStore {
    /// Create a store rooted at `base_path`.
    ///
    /// The base directory will be created if it doesn't exist. Retrieval URLs
    /// are `file://` URLs until [`FsBlobStore::with_public_url`] is used.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        let base_path = base_path.canonicalize()?;

        Ok(Self {
            base_path,
            public_url: None,
        })
    }

    /// Serve retrieval URLs under `public_url` instead of `file://`.
    pub fn with_public_url(mut self, public_url: &str) -> Result<Self> {
        // Without a trailing slash, Url::join would drop the last segment.
        let normalized = if public_url.ends_with('/') {
            public_url.to_string()
        } else {
            format!("{public_url}/")
        };
        let url = Url::parse(&normalized)
            .map_err(|e| ClassdropError::Config(format!("invalid public_url: {e}")))?;
        self.public_url = Some(url);
        Ok(self)
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve an object path to its location on disk.
    ///
    /// Only plain relative paths are accepted; `..`, absolute paths and
    /// empty paths are rejected.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if path.is_empty() || !plain {
            return Err(ClassdropError::Validation(format!(
                "invalid blob path: {path:?}"
            )));
        }

        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, content: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        let file_path = self.resolve(path)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        debug!(
            path,
            bytes = content.len(),
            content_type = content_type.unwrap_or("-"),
            "storing blob"
        );
        fs::write(&file_path, content).await?;

        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        let file_path = self.resolve(path)?;

        if !fs::try_exists(&file_path).await? {
            return Err(ClassdropError::NotFound(format!("blob {path}")));
        }

        let url = match self.public_url {
            Some(ref base) => base
                .join(path)
                .map_err(|e| ClassdropError::Validation(format!("invalid blob path: {e}")))?,
            None => Url::from_file_path(&file_path).map_err(|_| {
                ClassdropError::Validation(format!("blob path is not absolute: {path}"))
            })?,
        };

        Ok(url.to_string())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let file_path = self.resolve(path)?;

        match fs::remove_file(&file_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let file_path = self.resolve(path)?;
        Ok(fs::try_exists(&file_path).await?)
    }
}
