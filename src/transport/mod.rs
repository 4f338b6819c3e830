//! Submission transport
//!
//! A submission is one multi-part request: the non-document sections as a
//! single JSON text field, plus one binary part per attached document keyed
//! by its slot name and carrying the original filename and MIME type.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;

use crate::attachment::resolve_resource_path;
use crate::config::AdmissionConfig;

pub const FALLBACK_MESSAGE: &str = "Submission failed";

/// Error types for transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Could not read {slot}: {reason}")]
    Attachment { slot: String, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One binary part of a submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentPart {
    /// Multi-part field name, e.g. `birthCertificate`
    pub slot: String,
    pub file_name: String,
    pub mime_type: String,
    /// Resource handle the bytes are read from
    pub uri: String,
}

/// Everything a transport needs to send one submission
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionPayload {
    /// Name of the JSON text field
    pub form_field: String,
    /// Non-document sections
    pub form: Value,
    pub documents: Vec<DocumentPart>,
}

impl SubmissionPayload {
    pub fn form_json(&self) -> String {
        self.form.to_string()
    }

    pub fn document(&self, slot: &str) -> Option<&DocumentPart> {
        self.documents.iter().find(|d| d.slot == slot)
    }
}

/// Trait for anything that can deliver a submission
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload`, returning the parsed success body
    async fn submit(&self, payload: &SubmissionPayload) -> Result<Value, TransportError>;
}

/// HTTP transport posting `multipart/form-data`
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    document_dir: PathBuf,
    bearer_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &AdmissionConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            url: config.submit_url(),
            document_dir: config.document_dir.clone(),
            bearer_token: None,
        })
    }

    /// Attach `Authorization: Bearer <token>` to every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn build_form(&self, payload: &SubmissionPayload) -> Result<Form, TransportError> {
        let mut form = Form::new().text(payload.form_field.clone(), payload.form_json());

        for doc in &payload.documents {
            let path = resolve_resource_path(&doc.uri, &self.document_dir);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| TransportError::Attachment {
                    slot: doc.slot.clone(),
                    reason: e.to_string(),
                })?;
            log::debug!("Attaching {} ({}, {} bytes)", doc.slot, doc.mime_type, bytes.len());

            let part = Part::bytes(bytes)
                .file_name(doc.file_name.clone())
                .mime_str(&doc.mime_type)
                .map_err(|e| TransportError::Attachment {
                    slot: doc.slot.clone(),
                    reason: e.to_string(),
                })?;
            form = form.part(doc.slot.clone(), part);
        }

        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<Value, TransportError> {
        let form = self.build_form(payload).await?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        if !status.is_success() {
            let message = server_message(&body).unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
            log::warn!("Submission rejected with HTTP {}: {}", status.as_u16(), message);
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

/// `message` from a JSON error body, if the server sent one
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
