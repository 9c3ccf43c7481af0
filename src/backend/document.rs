//! Document model, queries and the document store trait.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::{ClassdropError, Result};

/// A stored document: its key within the collection plus its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Build a document from a serializable record.
    pub fn from_record<T: Serialize>(id: impl Into<String>, record: &T) -> Result<Self> {
        Ok(Self::new(id, serde_json::to_value(record)?))
    }

    /// Decode the body into an application record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            ClassdropError::Serialization(format!("document {}: {e}", self.id))
        })
    }

    /// Look up a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A query over one collection.
///
/// Filters are equality matches on top-level fields, combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<(String, Value)>,
    order: Option<(String, Direction)>,
}

impl Query {
    /// Start a query over every document in `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order: None,
        }
    }

    /// Keep only documents whose `field` equals `value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Sort results by `field`.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((field.into(), direction));
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Check whether a document satisfies every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| doc.field(field) == Some(expected))
    }

    /// Evaluate the query over documents given in insertion order.
    ///
    /// The sort is stable, so documents with equal keys keep insertion order.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((ref field, direction)) = self.order {
            matched.sort_by(|a, b| {
                let ord = compare_values(a.field(field), b.field(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        matched
    }
}

/// Order JSON values for sorting. Missing values sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Notification that a document was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
    pub id: String,
}

/// One operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set { collection: String, id: String, data: Value },
    Delete { collection: String, id: String },
}

/// A group of writes applied atomically by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, collection: impl Into<String>, id: impl Into<String>, data: Value) {
        self.ops.push(WriteOp::Set {
            collection: collection.into(),
            id: id.into(),
            data,
        });
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// A document database with change notification.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Insert a new document.
    ///
    /// Fails with `Conflict` when a document with that id already exists.
    async fn create(&self, collection: &str, doc: Document) -> Result<()>;

    /// Create or replace a document.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Merge top-level fields into an existing document.
    ///
    /// Fails with `NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()>;

    /// Delete a document.
    ///
    /// Returns `true` if it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Run a one-shot query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Apply every write in the batch, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Subscribe to change notifications for all collections.
    fn changes(&self) -> broadcast::Receiver<Change>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("a", json!({"classCode": "ABC123", "folderId": "f1", "at": 30})),
            Document::new("b", json!({"classCode": "ABC123", "folderId": "f2", "at": 10})),
            Document::new("c", json!({"classCode": "XYZ789", "folderId": "f1", "at": 20})),
            Document::new("d", json!({"classCode": "ABC123", "folderId": "f1", "at": 10})),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_query_without_filters_keeps_order() {
        let result = Query::collection("files").apply(docs());
        assert_eq!(ids(&result), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_query_where_eq_combines_filters() {
        let query = Query::collection("files")
            .where_eq("classCode", "ABC123")
            .where_eq("folderId", "f1");
        let result = query.apply(docs());
        assert_eq!(ids(&result), vec!["a", "d"]);
    }

    #[test]
    fn test_query_order_descending_is_stable() {
        let query = Query::collection("files").order_by("at", Direction::Descending);
        let result = query.apply(docs());
        // b and d tie at 10 and keep insertion order
        assert_eq!(ids(&result), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_query_order_ascending() {
        let query = Query::collection("files").order_by("at", Direction::Ascending);
        let result = query.apply(docs());
        assert_eq!(ids(&result), vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn test_missing_field_sorts_first() {
        let mut all = docs();
        all.push(Document::new("e", json!({"classCode": "ABC123"})));
        let query = Query::collection("files").order_by("at", Direction::Ascending);
        let result = query.apply(all);
        assert_eq!(result[0].id, "e");
    }

    #[test]
    fn test_document_decode_error_names_document() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Strict {
            required: String,
        }

        let doc = Document::new("broken", json!({"other": 1}));
        let err = doc.decode::<Strict>().unwrap_err();
        assert!(matches!(err, ClassdropError::Serialization(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_document_from_record() {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Record {
            class_code: String,
        }

        let record = Record {
            class_code: "ABC123".to_string(),
        };
        let doc = Document::from_record("r1", &record).unwrap();
        assert_eq!(doc.id, "r1");
        assert_eq!(doc.field("classCode"), Some(&json!("ABC123")));
    }

    #[test]
    fn test_write_batch_collects_ops() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.set("files", "a", json!({}));
        batch.delete("files", "b");
        assert_eq!(batch.len(), 2);

        let ops = batch.into_ops();
        assert!(matches!(ops[1], WriteOp::Delete { ref id, .. } if id == "b"));
    }
}
