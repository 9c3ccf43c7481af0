//! Backend services for classdrop.
//!
//! This module holds everything the data-access layer delegates to:
//! - A document store with change notification (SQLite)
//! - A blob store for uploaded file contents (local filesystem)
//! - Live query subscriptions over the document store
//!
//! [`Backend`] bundles both stores into the one process-wide handle.

mod blob;
mod document;
mod filesystem;
mod sqlite;
mod watch;

use std::sync::Arc;

use tracing::info;

pub use blob::BlobStore;
pub use document::{Change, Direction, Document, DocumentStore, Query, WriteBatch, WriteOp};
pub use filesystem::FsBlobStore;
pub use sqlite::SqliteDocumentStore;
pub use watch::{watch_document, watch_query, Subscription};

use crate::classroom::{ClassRepository, FileRepository};
use crate::config::Config;
use crate::{ClassdropError, Result};

/// Default number of class codes checked before creation gives up.
pub const DEFAULT_CODE_RETRY_LIMIT: usize = 3;

/// Display timezone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Process-wide backend handle.
///
/// Cloning is cheap; all clones share the same stores.
#[derive(Clone)]
pub struct Backend {
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    code_retry_limit: usize,
    timezone: String,
}

impl Backend {
    /// Create a backend over the given stores.
    pub fn new(documents: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            documents,
            blobs,
            code_retry_limit: DEFAULT_CODE_RETRY_LIMIT,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }

    /// Open the stores named in the configuration.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let documents = SqliteDocumentStore::open(&config.backend.database_url).await?;

        let mut blobs = FsBlobStore::new(&config.backend.storage_path)?;
        if let Some(ref public_url) = config.backend.public_url {
            blobs = blobs.with_public_url(public_url)?;
        }
        info!("Blob store at {:?}", blobs.base_path());

        Ok(Self::new(Arc::new(documents), Arc::new(blobs))
            .with_code_retry_limit(config.classes.code_retry_limit)?
            .with_timezone(&config.display.timezone))
    }

    /// Set how many generated class codes are checked for collisions.
    pub fn with_code_retry_limit(mut self, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(ClassdropError::Config(
                "code retry limit must be at least 1".to_string(),
            ));
        }
        self.code_retry_limit = limit;
        Ok(self)
    }

    /// Set the timezone screens use for displayed timestamps.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn code_retry_limit(&self) -> usize {
        self.code_retry_limit
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Repository for class records.
    pub fn classes(&self) -> ClassRepository {
        ClassRepository::new(self.clone())
    }

    /// Repository for file records.
    pub fn files(&self) -> FileRepository {
        FileRepository::new(self.clone())
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("code_retry_limit", &self.code_retry_limit)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}
