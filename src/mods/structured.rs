//! Structured-append modifications.
//!
//! Appends values into a named list under a named section of a restricted
//! JSON document (JSON plus full-line `//` and `#` comments, which some
//! build-description files carry). Comments are stripped before parsing;
//! the rewritten document is plain JSON.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::CodeModError;

/// Drop full-line `//` and `#` comments.
///
/// Only whole-line comments are recognized so string values containing
/// `//` (URLs) survive untouched.
fn strip_line_comments(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with("//") || trimmed.starts_with('#'))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append `values` to the list `list` under object key `section` of the
/// document at `path`, creating the section and the list when absent.
///
/// Returns `true` when the document changed (i.e. at least one value was
/// appended).
pub fn append_values(
    path: &Path,
    section: &str,
    list: &str,
    values: &[Value],
) -> Result<bool, CodeModError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CodeModError::StructuredDocument {
                file: path.display().to_string(),
                reason: "file not found".to_string(),
            }
        } else {
            CodeModError::Io(e)
        }
    })?;

    let stripped = strip_line_comments(&raw);
    let mut doc: Value =
        serde_json::from_str(&stripped).map_err(|e| CodeModError::StructuredDocument {
            file: path.display().to_string(),
            reason: format!("not a restricted-JSON document: {}", e),
        })?;

    let root = doc
        .as_object_mut()
        .ok_or_else(|| CodeModError::StructuredDocument {
            file: path.display().to_string(),
            reason: "document root is not an object".to_string(),
        })?;

    let section_value = root
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let section_obj =
        section_value
            .as_object_mut()
            .ok_or_else(|| CodeModError::StructuredDocument {
                file: path.display().to_string(),
                reason: format!("section '{}' is not an object", section),
            })?;

    let list_value = section_obj
        .entry(list.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    let list_arr = list_value
        .as_array_mut()
        .ok_or_else(|| CodeModError::StructuredDocument {
            file: path.display().to_string(),
            reason: format!("'{}.{}' is not a list", section, list),
        })?;

    if values.is_empty() {
        return Ok(false);
    }
    list_arr.extend(values.iter().cloned());

    let mut serialized = serde_json::to_string_pretty(&doc)?;
    serialized.push('\n');
    std::fs::write(path, serialized)?;
    Ok(true)
}
