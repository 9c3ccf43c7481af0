//! Test helpers for integration tests.
//!
//! Provides an in-memory backend, a recording blob store, a document store
//! whose writes can be failed or held, and helpers for writing local upload
//! sources.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tempfile::TempDir;
use tokio::sync::{broadcast, Notify};

use classdrop::backend::{
    Backend, BlobStore, Change, Document, DocumentStore, Query, SqliteDocumentStore, WriteBatch,
};
use classdrop::{ClassdropError, Result};

/// Default timeout for waiting on subscriptions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Blob store that keeps blobs in memory and records every delete call.
#[derive(Debug, Default)]
pub struct RecordingBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
    fail_deletes: AtomicBool,
    fail_download_urls: AtomicBool,
}

impl RecordingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delete fail with a transport error.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent `download_url` fail with a transport error.
    pub fn fail_download_urls(&self) {
        self.fail_download_urls.store(true, Ordering::SeqCst);
    }

    /// Paths passed to `delete`, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(path)
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(&self, path: &str, content: Vec<u8>, _content_type: Option<&str>) -> Result<()> {
        self.blobs.lock().unwrap().insert(path.to_string(), content);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        if self.fail_download_urls.load(Ordering::SeqCst) {
            return Err(ClassdropError::Transport("blob store unavailable".to_string()));
        }
        if !self.contains(path) {
            return Err(ClassdropError::NotFound(format!("blob {path}")));
        }
        Ok(format!("https://blobs.test/{path}"))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.deleted.lock().unwrap().push(path.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ClassdropError::Transport("blob store unavailable".to_string()));
        }
        Ok(self.blobs.lock().unwrap().remove(path).is_some())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.contains(path))
    }
}

/// Document store over in-memory SQLite whose writes can be failed or held.
#[derive(Debug)]
pub struct ControlledDocumentStore {
    inner: SqliteDocumentStore,
    fail_sets: AtomicBool,
    hold_next_write: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl ControlledDocumentStore {
    pub async fn new() -> Self {
        let inner = SqliteDocumentStore::open_in_memory()
            .await
            .expect("Failed to create test document store");
        Self {
            inner,
            fail_sets: AtomicBool::new(false),
            hold_next_write: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Make every subsequent `set` fail with a transport error.
    pub fn fail_sets(&self) {
        self.fail_sets.store(true, Ordering::SeqCst);
    }

    /// Pause the next `create` or `set` until `release` is called.
    pub fn hold_next_write(&self) {
        self.hold_next_write.store(true, Ordering::SeqCst);
    }

    /// Wait until a held write has started.
    pub async fn wait_for_held_write(&self) {
        self.entered.notified().await;
    }

    /// Let the held write continue.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pause(&self) {
        if self.hold_next_write.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl DocumentStore for ControlledDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn create(&self, collection: &str, doc: Document) -> Result<()> {
        self.pause().await;
        self.inner.create(collection, doc).await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.pause().await;
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(ClassdropError::Transport("document store unavailable".to_string()));
        }
        self.inner.set(collection, id, data).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()> {
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        self.inner.delete(collection, id).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.inner.query(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.inner.commit(batch).await
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.inner.changes()
    }
}

/// A backend over a controlled document store and a recording blob store.
pub struct TestBackend {
    pub backend: Backend,
    pub documents: Arc<ControlledDocumentStore>,
    pub blobs: Arc<RecordingBlobStore>,
    pub sources: TempDir,
}

impl TestBackend {
    /// Write a local file to upload from.
    pub fn source(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.sources.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// Create a test backend.
pub async fn setup() -> TestBackend {
    let documents = Arc::new(ControlledDocumentStore::new().await);
    let blobs = Arc::new(RecordingBlobStore::new());
    let backend = Backend::new(documents.clone(), blobs.clone());

    TestBackend {
        backend,
        documents,
        blobs,
        sources: TempDir::new().unwrap(),
    }
}

/// Sleep long enough for millisecond timestamps to differ.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
