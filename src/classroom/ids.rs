//! Class codes, record identifiers and blob paths.

use rand::Rng;

use crate::{ClassdropError, Result};

use super::{CLASS_CODE_LENGTH, ID_LENGTH};

/// Characters used in class codes.
const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Characters used in folder and file ids.
const ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn random_string(charset: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset[idx] as char
        })
        .collect()
}

/// Generate a class code: 6 uppercase letters or digits.
pub fn generate_class_code() -> String {
    random_string(CODE_CHARS, CLASS_CODE_LENGTH)
}

/// Generate a record id of `length` mixed-case letters or digits.
pub fn generate_id(length: usize) -> String {
    random_string(ID_CHARS, length)
}

/// Generate a folder or file id.
pub fn generate_record_id() -> String {
    generate_id(ID_LENGTH)
}

/// Check whether `code` is a well-formed class code.
pub fn is_valid_class_code(code: &str) -> bool {
    code.len() == CLASS_CODE_LENGTH && code.bytes().all(|b| CODE_CHARS.contains(&b))
}

/// Turn a typed-in class code into canonical form.
///
/// Surrounding whitespace is dropped and letters are uppercased.
pub fn normalize_class_code(input: &str) -> Result<String> {
    let code = input.trim().to_uppercase();

    if code.is_empty() {
        return Err(ClassdropError::Validation(
            "class code is empty".to_string(),
        ));
    }
    if !is_valid_class_code(&code) {
        return Err(ClassdropError::Validation(format!(
            "class code must be {CLASS_CODE_LENGTH} letters or digits"
        )));
    }

    Ok(code)
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Blob path of an uploaded file: `<classCode>/<folderId>/<fileId>-<sanitizedName>`.
pub fn blob_path(class_code: &str, folder_id: &str, file_id: &str, name: &str) -> String {
    format!(
        "{class_code}/{folder_id}/{file_id}-{}",
        sanitize_file_name(name)
    )
}
