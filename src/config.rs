//! Runtime configuration
//!
//! Every field has a default, so a config file only needs the values it
//! changes. `ADMISSION_BASE_URL` in the environment overrides `base_url`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attachment::MAX_ATTACHMENT_BYTES;
use crate::storage::draft::DEFAULT_DRAFT_KEY;

pub const BASE_URL_ENV: &str = "ADMISSION_BASE_URL";

/// Error types for configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Configuration for the admission client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Admissions API origin
    pub base_url: String,

    /// Path the multi-part submission is posted to
    pub submit_path: String,

    pub request_timeout_ms: u64,

    /// Key the single draft slot lives under
    pub draft_key: String,

    /// Quiet period after the last edit before the draft is written
    pub draft_debounce_ms: u64,

    /// Drafts older than this are discarded on load
    pub draft_max_age_hours: i64,

    pub max_attachment_bytes: u64,

    /// Base directory for resource handles that are not `file://` URIs
    pub document_dir: PathBuf,

    /// Multi-part field carrying the JSON sections
    pub form_field_name: String,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2025".to_string(),
            submit_path: "/api/admissions/save".to_string(),
            request_timeout_ms: 15_000,
            draft_key: DEFAULT_DRAFT_KEY.to_string(),
            draft_debounce_ms: 1_000,
            draft_max_age_hours: 24,
            max_attachment_bytes: MAX_ATTACHMENT_BYTES,
            document_dir: PathBuf::from("./documents"),
            form_field_name: "formData".to_string(),
        }
    }
}

impl AdmissionConfig {
    /// Read a JSON config file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.with_env_overrides())
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_base_url_override(std::env::var(BASE_URL_ENV).ok())
    }

    fn with_base_url_override(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn draft_debounce(&self) -> Duration {
        Duration::from_millis(self.draft_debounce_ms)
    }

    pub fn draft_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.draft_max_age_hours)
    }

    /// Full submission URL
    pub fn submit_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.submit_path.starts_with('/') {
            format!("{}{}", base, self.submit_path)
        } else {
            format!("{}/{}", base, self.submit_path)
        }
    }
}
