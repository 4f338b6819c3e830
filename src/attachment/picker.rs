//! Ingestion of document-picker results
//!
//! Picker libraries have reported selections in several shapes over time.
//! Everything is collapsed here into one [`AttachmentDescriptor`], so nothing
//! past this boundary looks at picker-specific field names.
//!
//! Accepted shapes:
//!
//! ```text
//! { "type": "success", "name", "uri", "size", "mimeType" }     legacy
//! { "type": "cancel" }
//! { "canceled": false, "assets": [ { "name", "uri", ... } ] }   current
//! { "canceled": true, "assets": null }
//! ```
//!
//! The `uri` field may itself be an object wrapping the handle under `uri`,
//! `_W` or `_X`.

use serde_json::{Map, Value};
use thiserror::Error;

use super::AttachmentDescriptor;

const WRAPPED_HANDLE_KEYS: [&str; 3] = ["uri", "_W", "_X"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PickerError {
    #[error("Unrecognized picker result: {0}")]
    Unrecognized(String),

    #[error("Picked file has no resource handle")]
    MissingHandle,
}

/// Normalize a raw picker result. `Ok(None)` means the user cancelled.
pub fn normalize(result: &Value) -> Result<Option<AttachmentDescriptor>, PickerError> {
    let object = result
        .as_object()
        .ok_or_else(|| PickerError::Unrecognized(result.to_string()))?;

    if object.get("canceled").and_then(Value::as_bool) == Some(true) {
        return Ok(None);
    }

    if let Some(assets) = object.get("assets") {
        return match assets.as_array().and_then(|a| a.first()) {
            Some(Value::Object(asset)) => descriptor_from(asset).map(Some),
            Some(other) => Err(PickerError::Unrecognized(other.to_string())),
            None => Ok(None),
        };
    }

    match object.get("type").and_then(Value::as_str) {
        Some("cancel") => Ok(None),
        Some("success") => descriptor_from(object).map(Some),
        _ if object.contains_key("uri") => descriptor_from(object).map(Some),
        _ => Err(PickerError::Unrecognized(result.to_string())),
    }
}

fn descriptor_from(fields: &Map<String, Value>) -> Result<AttachmentDescriptor, PickerError> {
    let uri = fields
        .get("uri")
        .and_then(resolve_handle)
        .ok_or(PickerError::MissingHandle)?;

    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| file_name_of(&uri));

    // "type" doubles as the MIME type on asset entries
    let mime_type = ["mimeType", "type"]
        .iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .find(|m| m.contains('/'))
        .map(str::to_string);

    let size_bytes = ["size", "sizeBytes"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_u64))
        .unwrap_or(0);

    Ok(AttachmentDescriptor {
        name,
        uri,
        mime_type,
        size_bytes,
    })
}

fn resolve_handle(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(wrapper) => WRAPPED_HANDLE_KEYS
            .iter()
            .find_map(|key| wrapper.get(*key).and_then(resolve_handle)),
        _ => None,
    }
}

fn file_name_of(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or(uri).to_string()
}
