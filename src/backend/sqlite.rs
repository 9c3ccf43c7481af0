//! SQLite-backed document store.
//!
//! Every collection lives in one `documents` table keyed by
//! `(collection, id)`. Bodies are stored as JSON text; queries load the
//! collection in insertion order and are evaluated by [`Query::apply`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::document::{Change, Document, DocumentStore, Query, WriteBatch, WriteOp};
use crate::{ClassdropError, Result};

/// Schema migrations, applied in order. Index + 1 is the schema version.
const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE documents (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    collection  TEXT NOT NULL,
    id          TEXT NOT NULL,
    data        TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (collection, id)
);
CREATE INDEX idx_documents_collection ON documents (collection, seq);
"#];

/// Capacity of the change notification channel.
const CHANGE_CAPACITY: usize = 256;

/// Document store over a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    changes: broadcast::Sender<Change>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database at `url`, e.g. `sqlite://data/classdrop.db`.
    ///
    /// Parent directories of the database file are created if missing.
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let filename = options.get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening document store at {:?}", filename);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory document store");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let store = Self { pool, changes };
        store.migrate().await?;
        Ok(store)
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        let current = self.schema_version().await?;
        if current as usize >= MIGRATIONS.len() {
            debug!("Document store is up to date (version {})", current);
            return Ok(());
        }

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current as usize) {
            let version = (i + 1) as i64;
            info!("Applying document store migration v{}", version);

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        Ok(())
    }

    fn notify(&self, collection: &str, id: &str) {
        // No receivers is fine: nobody is watching.
        let _ = self.changes.send(Change {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }
}

fn parse_body(collection: &str, id: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| {
        ClassdropError::Serialization(format!("document {collection}/{id}: {e}"))
    })
}

async fn read_body(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
) -> Result<Option<Value>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(|(text,)| parse_body(collection, id, &text))
        .transpose()
}

async fn upsert(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
    data: &Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)
         ON CONFLICT (collection, id)
         DO UPDATE SET data = excluded.data, updated_at = datetime('now')",
    )
    .bind(collection)
    .bind(id)
    .bind(data.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert(
    conn: &mut SqliteConnection,
    collection: &str,
    id: &str,
    data: &Value,
) -> Result<()> {
    let result = sqlx::query("INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)")
        .bind(collection)
        .bind(id)
        .bind(data.to_string())
        .execute(&mut *conn)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
            ClassdropError::Conflict(format!("document {collection}/{id} already exists")),
        ),
        Err(e) => Err(e.into()),
    }
}

async fn remove(conn: &mut SqliteConnection, collection: &str, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
        .bind(collection)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let mut conn = self.pool.acquire().await?;
        let body = read_body(&mut conn, collection, id).await?;
        Ok(body.map(|data| Document::new(id, data)))
    }

    async fn create(&self, collection: &str, doc: Document) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, collection, &doc.id, &doc.data).await?;
        drop(conn);

        self.notify(collection, &doc.id);
        Ok(())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, collection, id, &data).await?;
        drop(conn);

        self.notify(collection, id);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let body = read_body(&mut tx, collection, id)
            .await?
            .ok_or_else(|| ClassdropError::NotFound(format!("document {collection}/{id}")))?;

        let merged = match body {
            Value::Object(mut existing) => {
                existing.extend(fields);
                Value::Object(existing)
            }
            _ => Value::Object(fields),
        };

        upsert(&mut tx, collection, id, &merged).await?;
        tx.commit().await?;

        self.notify(collection, id);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let deleted = remove(&mut conn, collection, id).await?;
        drop(conn);

        if deleted {
            self.notify(collection, id);
        }
        Ok(deleted)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let collection = query.collection_name();
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, data FROM documents WHERE collection = ? ORDER BY seq")
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;

        let docs = rows
            .into_iter()
            .map(|(id, text)| {
                let data = parse_body(collection, &id, &text)?;
                Ok(Document::new(id, data))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(query.apply(docs))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut touched = Vec::with_capacity(batch.len());

        for op in batch.into_ops() {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    upsert(&mut tx, &collection, &id, &data).await?;
                    touched.push((collection, id));
                }
                WriteOp::Delete { collection, id } => {
                    if remove(&mut tx, &collection, &id).await? {
                        touched.push((collection, id));
                    }
                }
            }
        }

        tx.commit().await?;

        for (collection, id) in &touched {
            self.notify(collection, id);
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::document::Direction;
    use serde_json::json;

    async fn setup_store() -> SqliteDocumentStore {
        SqliteDocumentStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_migrations_applied() {
        let store = setup_store().await;
        assert_eq!(store.schema_version().await.unwrap(), MIGRATIONS.len() as i64);

        // Re-running is a no-op.
        store.migrate().await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = setup_store().await;
        store
            .set("classes", "ABC123", json!({"code": "ABC123", "folders": []}))
            .await
            .unwrap();

        let doc = store.get("classes", "ABC123").await.unwrap().unwrap();
        assert_eq!(doc.id, "ABC123");
        assert_eq!(doc.data["code"], "ABC123");

        assert!(store.get("classes", "NOPE00").await.unwrap().is_none());
        assert!(store.get("files", "ABC123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_existing_id() {
        let store = setup_store().await;
        let mut changes = store.changes();

        store
            .create("classes", Document::new("ABC123", json!({"folders": ["kept"]})))
            .await
            .unwrap();
        assert_eq!(changes.recv().await.unwrap().id, "ABC123");

        let result = store
            .create("classes", Document::new("ABC123", json!({"folders": []})))
            .await;
        assert!(matches!(result, Err(ClassdropError::Conflict(_))));
        assert!(changes.try_recv().is_err());

        let doc = store.get("classes", "ABC123").await.unwrap().unwrap();
        assert_eq!(doc.data["folders"], json!(["kept"]));

        // The same id in another collection is a different document.
        store
            .create("files", Document::new("ABC123", json!({})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_replaces_body() {
        let store = setup_store().await;
        store.set("files", "f1", json!({"name": "a", "extra": 1})).await.unwrap();
        store.set("files", "f1", json!({"name": "b"})).await.unwrap();

        let doc = store.get("files", "f1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"name": "b"}));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = setup_store().await;
        store
            .set("files", "f1", json!({"name": "old.pdf", "path": "p"}))
            .await
            .unwrap();

        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("new.pdf"));
        store.update("files", "f1", fields).await.unwrap();

        let doc = store.get("files", "f1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"name": "new.pdf", "path": "p"}));
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let store = setup_store().await;
        let result = store.update("files", "ghost", Map::new()).await;
        assert!(matches!(result, Err(ClassdropError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = setup_store().await;
        store.set("files", "f1", json!({})).await.unwrap();

        assert!(store.delete("files", "f1").await.unwrap());
        assert!(!store.delete("files", "f1").await.unwrap());
        assert!(store.get("files", "f1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = setup_store().await;
        store.set("files", "a", json!({"classCode": "C1", "at": 1})).await.unwrap();
        store.set("files", "b", json!({"classCode": "C2", "at": 2})).await.unwrap();
        store.set("files", "c", json!({"classCode": "C1", "at": 3})).await.unwrap();
        store.set("classes", "C1", json!({"classCode": "C1"})).await.unwrap();

        let query = Query::collection("files")
            .where_eq("classCode", "C1")
            .order_by("at", Direction::Descending);
        let docs = store.query(&query).await.unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_insertion_position() {
        let store = setup_store().await;
        store.set("files", "a", json!({"v": 1})).await.unwrap();
        store.set("files", "b", json!({"v": 1})).await.unwrap();
        store.set("files", "a", json!({"v": 2})).await.unwrap();

        let docs = store.query(&Query::collection("files")).await.unwrap();
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[0].data["v"], 2);
    }

    #[tokio::test]
    async fn test_commit_batch() {
        let store = setup_store().await;
        store.set("files", "a", json!({})).await.unwrap();
        store.set("files", "b", json!({})).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("files", "a");
        batch.delete("files", "b");
        batch.set("files", "c", json!({"name": "c"}));
        store.commit(batch).await.unwrap();

        let docs = store.query(&Query::collection("files")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "c");
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let store = setup_store().await;
        let mut changes = store.changes();

        store.set("classes", "ABC123", json!({})).await.unwrap();
        let change = changes.recv().await.unwrap();
        assert_eq!(
            change,
            Change {
                collection: "classes".to_string(),
                id: "ABC123".to_string(),
            }
        );

        // Deleting a missing document publishes nothing.
        assert!(!store.delete("classes", "ZZZZZZ").await.unwrap());
        store.delete("classes", "ABC123").await.unwrap();
        let change = changes.recv().await.unwrap();
        assert_eq!(change.id, "ABC123");
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("docs.db");
        let url = format!("sqlite://{}", path.display());

        {
            let store = SqliteDocumentStore::open(&url).await.unwrap();
            store.set("classes", "ABC123", json!({"code": "ABC123"})).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteDocumentStore::open(&url).await.unwrap();
        let doc = reopened.get("classes", "ABC123").await.unwrap();
        assert!(doc.is_some());
    }
}
