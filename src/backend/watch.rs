//! Live query subscriptions.
//!
//! A watcher task re-runs its query whenever the document store reports a
//! change in the watched scope and pushes the fresh snapshot to the
//! subscriber. Dropping the [`Subscription`] stops the task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::document::{Change, Document, DocumentStore, Query};
use crate::Result;

/// Snapshots buffered ahead of a slow subscriber.
const SNAPSHOT_BUFFER: usize = 16;

/// Push-based stream of snapshots with explicit unsubscribe.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop receiving snapshots.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    /// Whether the watcher task is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Which changes wake a watcher.
#[derive(Debug, Clone)]
struct Scope {
    collection: String,
    id: Option<String>,
}

impl Scope {
    fn covers(&self, change: &Change) -> bool {
        change.collection == self.collection
            && self.id.as_ref().map_or(true, |id| *id == change.id)
    }
}

fn spawn_watcher<T, F, Fut>(
    store: Arc<dyn DocumentStore>,
    scope: Scope,
    fetch: F,
) -> Subscription<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn DocumentStore>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
    // Subscribe before the first fetch so no change can slip in between.
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        debug!(collection = %scope.collection, id = ?scope.id, "watch started");
        loop {
            match fetch(Arc::clone(&store)).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(collection = %scope.collection, "watch query failed: {e}"),
            }

            loop {
                match changes.recv().await {
                    Ok(change) if scope.covers(&change) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "watch lagged, re-querying");
                        break;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
        debug!(collection = %scope.collection, "watch ended");
    });

    Subscription { rx, task }
}

/// Watch the results of `query`, mapped through `map`.
pub fn watch_query<T, M>(store: Arc<dyn DocumentStore>, query: Query, map: M) -> Subscription<T>
where
    T: Send + 'static,
    M: Fn(Vec<Document>) -> T + Send + Sync + 'static,
{
    let scope = Scope {
        collection: query.collection_name().to_string(),
        id: None,
    };
    let query = Arc::new(query);
    let map = Arc::new(map);

    spawn_watcher(store, scope, move |store| {
        let query = Arc::clone(&query);
        let map = Arc::clone(&map);
        async move {
            let docs = store.query(&query).await?;
            Ok(map(docs))
        }
    })
}

/// Watch a single document, mapped through `map`.
///
/// The mapper receives `None` while the document does not exist.
pub fn watch_document<T, M>(
    store: Arc<dyn DocumentStore>,
    collection: impl Into<String>,
    id: impl Into<String>,
    map: M,
) -> Subscription<T>
where
    T: Send + 'static,
    M: Fn(Option<Document>) -> T + Send + Sync + 'static,
{
    let (collection, id): (String, String) = (collection.into(), id.into());
    let collection: Arc<str> = Arc::from(collection);
    let id: Arc<str> = Arc::from(id);
    let scope = Scope {
        collection: collection.to_string(),
        id: Some(id.to_string()),
    };
    let map = Arc::new(map);

    spawn_watcher(store, scope, move |store| {
        let collection = Arc::clone(&collection);
        let id = Arc::clone(&id);
        let map = Arc::clone(&map);
        async move {
            let doc = store.get(&collection, &id).await?;
            Ok(map(doc))
        }
    })
}
