//! Attachment descriptors and pre-upload checks
//!
//! A descriptor is only admitted into form state (and only transmitted) once
//! the referenced resource exists, fits the size limit, and resolves to one
//! of the accepted MIME types. Checks run in that order and stop at the
//! first failure.

pub mod picker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::fs as tokio_fs;

pub const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 3] = ["application/pdf", "image/jpeg", "image/png"];

const FILE_SCHEME: &str = "file://";

/// One picked document, owned by a slot under `documents`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    pub name: String,
    /// Opaque resource handle as returned by the picker
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
}

impl AttachmentDescriptor {
    /// MIME type from the descriptor, falling back to the file extension
    pub fn resolved_mime_type(&self) -> Option<String> {
        self.mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(normalize_mime)
            .or_else(|| mime_from_extension(&self.name).map(str::to_string))
    }

    /// The shape stored under `documents.<slot>`
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "name": self.name,
            "uri": self.uri,
            "sizeBytes": self.size_bytes,
        });
        if let (Some(mime), Some(fields)) = (&self.mime_type, value.as_object_mut()) {
            fields.insert("mimeType".to_string(), Value::String(mime.clone()));
        }
        value
    }
}

/// Error types for attachment checks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("Invalid file information")]
    MissingDescriptor,

    #[error("Missing file URI")]
    MissingResource,

    #[error("File not found")]
    NotFound,

    #[error("File size exceeds {} limit", size_label(.limit_bytes))]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Invalid file type. Allowed: PDF, JPEG, PNG")]
    InvalidType(Option<String>),

    #[error("Unknown document slot: {0}")]
    UnknownSlot(String),

    #[error("Could not inspect file: {0}")]
    Inspection(String),
}

/// What the filesystem knows about a resource
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub exists: bool,
    pub size_bytes: u64,
}

/// Trait for filesystem metadata providers
#[async_trait]
pub trait FileMetadata: Send + Sync {
    /// Existence and size of the resource behind `uri`
    async fn info(&self, uri: &str) -> Result<FileInfo, AttachmentError>;

    /// MIME type of the resource, when the provider can tell
    async fn mime_type(&self, uri: &str) -> Option<String>;
}

/// Map a filename extension to its MIME type
pub fn mime_from_extension(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Whole MB or KB when the limit divides evenly, bytes otherwise
fn size_label(bytes: &u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    match *bytes {
        b if b >= MB && b % MB == 0 => format!("{}MB", b / MB),
        b if b >= KB && b % KB == 0 => format!("{}KB", b / KB),
        b => format!("{} bytes", b),
    }
}

fn normalize_mime(mime: &str) -> String {
    let lowered = mime.to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

/// Turn a resource handle into a local path.
///
/// `file://` handles are absolute; anything else is relative to `document_dir`.
pub fn resolve_resource_path(uri: &str, document_dir: &Path) -> PathBuf {
    match uri.strip_prefix(FILE_SCHEME) {
        Some(local) => PathBuf::from(local),
        None => document_dir.join(uri),
    }
}

/// Filesystem metadata for resources on the local disk
pub struct LocalFileSystem {
    document_dir: PathBuf,
}

impl LocalFileSystem {
    pub fn new(document_dir: impl Into<PathBuf>) -> Self {
        Self {
            document_dir: document_dir.into(),
        }
    }

    pub fn resolve(&self, uri: &str) -> PathBuf {
        resolve_resource_path(uri, &self.document_dir)
    }
}

#[async_trait]
impl FileMetadata for LocalFileSystem {
    async fn info(&self, uri: &str) -> Result<FileInfo, AttachmentError> {
        match tokio_fs::metadata(self.resolve(uri)).await {
            Ok(meta) if meta.is_file() => Ok(FileInfo {
                exists: true,
                size_bytes: meta.len(),
            }),
            Ok(_) => Ok(FileInfo::default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileInfo::default()),
            Err(e) => Err(AttachmentError::Inspection(e.to_string())),
        }
    }

    async fn mime_type(&self, uri: &str) -> Option<String> {
        let path = self.resolve(uri);
        let name = path.file_name()?.to_str()?;
        mime_from_extension(name).map(str::to_string)
    }
}

/// Gatekeeper for attachments
#[derive(Clone)]
pub struct AttachmentValidator {
    metadata: Arc<dyn FileMetadata>,
    max_bytes: u64,
}

impl AttachmentValidator {
    pub fn new(metadata: Arc<dyn FileMetadata>) -> Self {
        Self {
            metadata,
            max_bytes: MAX_ATTACHMENT_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn metadata(&self) -> &Arc<dyn FileMetadata> {
        &self.metadata
    }

    /// Run every check against `descriptor`, stopping at the first failure
    pub async fn validate(
        &self,
        descriptor: Option<&AttachmentDescriptor>,
    ) -> Result<(), AttachmentError> {
        let descriptor = descriptor.ok_or(AttachmentError::MissingDescriptor)?;
        if descriptor.uri.trim().is_empty() {
            return Err(AttachmentError::MissingResource);
        }

        let info = self.metadata.info(&descriptor.uri).await?;
        if !info.exists {
            return Err(AttachmentError::NotFound);
        }

        // the filesystem's size is what gets uploaded; the picker's is advisory
        if info.size_bytes > self.max_bytes {
            return Err(AttachmentError::TooLarge {
                size_bytes: info.size_bytes,
                limit_bytes: self.max_bytes,
            });
        }

        match descriptor.resolved_mime_type() {
            Some(mime) if ALLOWED_MIME_TYPES.contains(&mime.as_str()) => Ok(()),
            other => Err(AttachmentError::InvalidType(other)),
        }
    }
}
