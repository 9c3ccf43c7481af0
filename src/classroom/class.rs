//! Class records and their embedded folders.

use std::sync::Arc;

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::{debug, info, warn};

use crate::backend::{
    watch_document, watch_query, Backend, Direction, Document, Query, Subscription,
};
use crate::{ClassdropError, Result};

use super::ids::{generate_class_code, generate_record_id};
use super::{decode_all, now, validate_name};

/// Collection holding class documents.
pub const CLASSES: &str = "classes";

/// A named group of files inside a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Folder id, unique within its class.
    pub id: String,
    /// Display name.
    pub name: String,
    /// When the folder was created.
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// A class, identified by its short shareable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    /// Class code (also the document key).
    pub code: String,
    /// When the class was created.
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Folders, in creation order.
    #[serde(default)]
    pub folders: Vec<Folder>,
}

impl ClassRecord {
    /// Find a folder by id.
    pub fn folder(&self, folder_id: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.id == folder_id)
    }
}

type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Repository for class records.
///
/// Folder edits rewrite the whole embedded folder list; concurrent edits
/// to the same class from two clients are last-writer-wins.
#[derive(Clone)]
pub struct ClassRepository {
    backend: Backend,
    generate_code: IdGenerator,
    generate_folder_id: IdGenerator,
}

impl ClassRepository {
    /// Create a new ClassRepository over the given backend.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            generate_code: Arc::new(generate_class_code),
            generate_folder_id: Arc::new(generate_record_id),
        }
    }

    /// Replace the class code generator.
    pub fn with_code_generator(
        mut self,
        generate: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.generate_code = Arc::new(generate);
        self
    }

    /// Replace the folder id generator.
    pub fn with_folder_id_generator(
        mut self,
        generate: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.generate_folder_id = Arc::new(generate);
        self
    }

    /// Create a class with a fresh code and no folders.
    ///
    /// Each candidate code is inserted with an insert-only write, so two
    /// concurrent creates can never claim the same code. A taken code moves
    /// on to the next candidate, up to the backend's code retry limit; after
    /// that it fails with `Conflict` and no existing class is touched.
    pub async fn create(&self) -> Result<ClassRecord> {
        let limit = self.backend.code_retry_limit();

        for attempt in 1..=limit {
            let record = ClassRecord {
                code: (self.generate_code)(),
                created_at: now(),
                folders: Vec::new(),
            };
            let doc = Document::from_record(&record.code, &record)?;

            match self.backend.documents().create(CLASSES, doc).await {
                Ok(()) => {
                    info!(code = %record.code, "class created");
                    return Ok(record);
                }
                Err(ClassdropError::Conflict(_)) => {
                    debug!(attempt, code = %record.code, "class code already taken");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(limit, "every generated class code collided");
        Err(ClassdropError::Conflict(format!(
            "no free class code after {limit} attempts"
        )))
    }

    /// Get a class by code.
    pub async fn get(&self, code: &str) -> Result<Option<ClassRecord>> {
        let doc = self.backend.documents().get(CLASSES, code).await?;
        doc.map(|d| d.decode()).transpose()
    }

    /// Get a class by code, failing with `NotFound` if it doesn't exist.
    pub async fn require(&self, code: &str) -> Result<ClassRecord> {
        self.get(code)
            .await?
            .ok_or_else(|| ClassdropError::NotFound(format!("class {code}")))
    }

    /// Check whether a class exists.
    pub async fn exists(&self, code: &str) -> Result<bool> {
        Ok(self.backend.documents().get(CLASSES, code).await?.is_some())
    }

    /// Watch all classes, newest first.
    pub fn watch_all(&self) -> Subscription<Vec<ClassRecord>> {
        let query = Query::collection(CLASSES).order_by("createdAt", Direction::Descending);
        watch_query(
            Arc::clone(self.backend.documents()),
            query,
            decode_all::<ClassRecord>,
        )
    }

    /// Watch one class. Yields `None` while the class doesn't exist.
    pub fn watch(&self, code: &str) -> Subscription<Option<ClassRecord>> {
        watch_document(
            Arc::clone(self.backend.documents()),
            CLASSES,
            code,
            |doc| {
                doc.and_then(|d| match d.decode() {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("malformed class document: {e}");
                        None
                    }
                })
            },
        )
    }

    /// Add a folder to a class.
    ///
    /// The new id is checked against the class's existing folders; fails
    /// with `Conflict` if every candidate up to the retry limit is taken.
    pub async fn add_folder(&self, code: &str, name: &str) -> Result<Folder> {
        let name = validate_name("folder", name)?;
        let mut class = self.require(code).await?;
        let id = self.free_folder_id(&class)?;

        let folder = Folder {
            id,
            name,
            created_at: now(),
        };
        class.folders.push(folder.clone());
        self.write_folders(code, &class.folders).await?;

        info!(code, folder_id = %folder.id, "folder added");
        Ok(folder)
    }

    /// Rename a folder. Only the name changes.
    pub async fn rename_folder(&self, code: &str, folder_id: &str, name: &str) -> Result<()> {
        let name = validate_name("folder", name)?;
        let mut class = self.require(code).await?;

        let folder = class
            .folders
            .iter_mut()
            .find(|f| f.id == folder_id)
            .ok_or_else(|| ClassdropError::NotFound(format!("folder {folder_id}")))?;
        folder.name = name;

        self.write_folders(code, &class.folders).await?;
        info!(code, folder_id, "folder renamed");
        Ok(())
    }

    /// Remove a folder and every file record filed under it.
    ///
    /// A missing class is not an error. Returns the number of file records
    /// removed.
    pub async fn remove_folder(&self, code: &str, folder_id: &str) -> Result<usize> {
        let Some(mut class) = self.get(code).await? else {
            debug!(code, "remove_folder on missing class");
            return Ok(0);
        };

        class.folders.retain(|f| f.id != folder_id);
        self.write_folders(code, &class.folders).await?;

        let removed = self
            .backend
            .files()
            .delete_by_folder(code, folder_id)
            .await?;

        info!(code, folder_id, files = removed, "folder removed");
        Ok(removed)
    }

    fn free_folder_id(&self, class: &ClassRecord) -> Result<String> {
        let limit = self.backend.code_retry_limit();
        for attempt in 1..=limit {
            let id = (self.generate_folder_id)();
            if class.folder(&id).is_none() {
                return Ok(id);
            }
            debug!(attempt, code = %class.code, folder_id = %id, "folder id already taken");
        }

        warn!(limit, code = %class.code, "every generated folder id collided");
        Err(ClassdropError::Conflict(format!(
            "no free folder id in class {} after {limit} attempts",
            class.code
        )))
    }

    async fn write_folders(&self, code: &str, folders: &[Folder]) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("folders".to_string(), serde_json::to_value(folders)?);
        self.backend
            .documents()
            .update(CLASSES, code, fields)
            .await
            .map_err(|e| match e {
                ClassdropError::NotFound(_) => ClassdropError::NotFound(format!("class {code}")),
                other => other,
            })
    }
}

impl std::fmt::Debug for ClassRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRepository")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}
