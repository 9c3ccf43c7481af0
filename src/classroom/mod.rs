//! Classroom data-access layer.
//!
//! Classes are documents keyed by their short code, with folders embedded
//! in the class document. Files are separate documents that reference
//! their class and folder by id; their contents live in the blob store.

mod class;
mod file;
mod ids;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::backend::Document;
use crate::{ClassdropError, Result};

pub use class::{ClassRecord, ClassRepository, Folder, CLASSES};
pub use file::{FileRecord, FileRepository, UploadInput, FILES};
pub use ids::{
    blob_path, generate_class_code, generate_id, generate_record_id, is_valid_class_code,
    normalize_class_code, sanitize_file_name,
};

/// Length of a class code.
pub const CLASS_CODE_LENGTH: usize = 6;

/// Length of folder and file ids.
pub const ID_LENGTH: usize = 12;

/// Maximum length for folder and file names (in characters).
pub const MAX_NAME_LENGTH: usize = 200;

/// Trim a user-entered folder or file name and reject blank or oversized ones.
pub fn validate_name(kind: &str, name: &str) -> Result<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ClassdropError::Validation(format!("{kind} name is empty")));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ClassdropError::Validation(format!(
            "{kind} name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }

    Ok(name.to_string())
}

/// Current time at the millisecond precision records are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Decode documents into records, skipping (and logging) malformed ones.
fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("skipping malformed record: {e}");
                None
            }
        })
        .collect()
}
