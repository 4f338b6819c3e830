//! Admission form session controller
//!
//! Owns the canonical [`FormState`] for one form session and drives it
//! through `Editing -> Validating -> Submitting -> Succeeded | Failed`.
//!
//! The controller is shared by handle (`Arc<FormStateController>`); all
//! methods take `&self`. Only one submission may be in flight at a time.
//! Validation and attachment failures come back as [`SubmitOutcome`] data,
//! while transport failures and concurrent submits are errors. No failure
//! path touches the user's in-memory input.

pub mod debounce;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::attachment::picker::{self, PickerError};
use crate::attachment::{AttachmentDescriptor, AttachmentError, AttachmentValidator};
use crate::config::AdmissionConfig;
use crate::form::{
    FormState, ValidationEngine, ValidationResult, DOCUMENTS_SECTION, DOCUMENT_SLOTS,
};
use crate::storage::DraftStore;
use crate::transport::{DocumentPart, SubmissionPayload, Transport, TransportError};

pub use debounce::{DraftDebouncer, DEFAULT_DEBOUNCE};

pub const DEFAULT_FORM_FIELD: &str = "formData";

/// Where the session is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormPhase {
    Editing,
    Validating,
    Submitting,
    Succeeded,
    /// Last submit failed; the next edit returns to `Editing`
    Failed,
}

/// Non-exceptional results of a submit attempt
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Server accepted the application; carries its response body
    Accepted(Value),

    /// Field validation failed; nothing was sent
    Invalid(ValidationResult),

    /// A document failed its checks; nothing was sent
    AttachmentRejected { slot: String, error: AttachmentError },
}

/// Error types for submit attempts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("A submission is already in progress")]
    AlreadySubmitting,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Builder for [`FormStateController`]
pub struct ControllerBuilder {
    drafts: DraftStore,
    attachments: AttachmentValidator,
    transport: Arc<dyn Transport>,
    debounce: Duration,
    form_field: String,
    applicant_id: Option<String>,
}

impl ControllerBuilder {
    /// Take debounce window and form field name from `config`
    pub fn with_config(mut self, config: &AdmissionConfig) -> Self {
        self.debounce = config.draft_debounce();
        self.form_field = config.form_field_name.clone();
        self
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn with_form_field(mut self, name: impl Into<String>) -> Self {
        self.form_field = name.into();
        self
    }

    /// Applicant the submission is stamped with
    pub fn with_applicant_id(mut self, applicant_id: impl Into<String>) -> Self {
        self.applicant_id = Some(applicant_id.into());
        self
    }

    /// Build the controller, starting from a fresh draft if one exists and
    /// from the empty template otherwise
    pub async fn load_or_initialize(self) -> FormStateController {
        let (state, restored) = match self.drafts.load().await {
            Some(draft) => (draft, true),
            None => (FormState::template(), false),
        };

        let session_id = Uuid::new_v4();
        log::info!(
            "Admission form session {} started from {}",
            session_id,
            if restored { "saved draft" } else { "empty template" }
        );

        FormStateController {
            session_id,
            restored,
            state: Mutex::new(state),
            errors: Mutex::new(BTreeMap::new()),
            phase: Mutex::new(FormPhase::Editing),
            last_error: Mutex::new(None),
            submitting: AtomicBool::new(false),
            applicant_id: self.applicant_id,
            form_field: self.form_field,
            engine: ValidationEngine::new(),
            debouncer: DraftDebouncer::new(self.drafts.clone(), self.debounce),
            drafts: self.drafts,
            attachments: self.attachments,
            transport: self.transport,
        }
    }
}

/// Clears the in-flight flag however the submission ends
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Form path of a known document slot
fn slot_path(slot: &str) -> Result<String, AttachmentError> {
    if DOCUMENT_SLOTS.contains(&slot) {
        Ok(format!("{DOCUMENTS_SECTION}.{slot}"))
    } else {
        Err(AttachmentError::UnknownSlot(slot.to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct FormStateController {
    session_id: Uuid,
    restored: bool,
    state: Mutex<FormState>,
    errors: Mutex<BTreeMap<String, String>>,
    phase: Mutex<FormPhase>,
    last_error: Mutex<Option<String>>,
    submitting: AtomicBool,
    applicant_id: Option<String>,
    form_field: String,
    engine: ValidationEngine,
    debouncer: DraftDebouncer,
    drafts: DraftStore,
    attachments: AttachmentValidator,
    transport: Arc<dyn Transport>,
}

impl FormStateController {
    pub fn builder(
        drafts: DraftStore,
        attachments: AttachmentValidator,
        transport: Arc<dyn Transport>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            drafts,
            attachments,
            transport,
            debounce: DEFAULT_DEBOUNCE,
            form_field: DEFAULT_FORM_FIELD.to_string(),
            applicant_id: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The session started from a saved draft
    pub fn restored_from_draft(&self) -> bool {
        self.restored
    }

    /// Copy of the current form state
    pub fn snapshot(&self) -> FormState {
        lock(&self.state).clone()
    }

    /// Errors from the most recent validation pass
    pub fn errors(&self) -> BTreeMap<String, String> {
        lock(&self.errors).clone()
    }

    pub fn phase(&self) -> FormPhase {
        *lock(&self.phase)
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn clear_error(&self) {
        *lock(&self.last_error) = None;
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// A draft write is waiting for its debounce window
    pub fn has_pending_draft(&self) -> bool {
        self.debouncer.is_pending()
    }

    fn set_phase(&self, phase: FormPhase) {
        *lock(&self.phase) = phase;
    }

    /// Replace the value at `path`, drop all shown errors, and schedule a
    /// draft write of the new state. Paths with an empty segment (including
    /// the empty path) are refused and return `false`.
    pub fn update_field(&self, path: &str, value: Value) -> bool {
        if path.split('.').any(str::is_empty) {
            log::warn!("Session {}: ignoring update to invalid path {:?}", self.session_id, path);
            return false;
        }

        let snapshot = {
            let mut state = lock(&self.state);
            *state = state.with_field(path, value);
            state.clone()
        };
        lock(&self.errors).clear();

        {
            let mut phase = lock(&self.phase);
            if matches!(*phase, FormPhase::Failed | FormPhase::Succeeded) {
                *phase = FormPhase::Editing;
            }
        }

        self.debouncer.schedule(snapshot);
        true
    }

    /// Store a picked document in `slot` once it passes the attachment
    /// checks. `None` (a cancelled pick) leaves the slot untouched and
    /// returns `Ok(false)`. A rejection is returned, not recorded in
    /// [`errors`](Self::errors).
    pub async fn attach_document(
        &self,
        slot: &str,
        picked: Option<AttachmentDescriptor>,
    ) -> Result<bool, AttachmentError> {
        let slot_path = slot_path(slot)?;
        let Some(mut descriptor) = picked else {
            return Ok(false);
        };

        if descriptor.mime_type.is_none() {
            descriptor.mime_type = self.attachments.metadata().mime_type(&descriptor.uri).await;
        }

        if let Err(e) = self.attachments.validate(Some(&descriptor)).await {
            log::info!("Rejected {} for {}: {}", descriptor.name, slot, e);
            return Err(e);
        }

        self.update_field(&slot_path, descriptor.to_value());
        Ok(true)
    }

    /// Ingest a raw document-picker result for `slot`
    pub async fn attach_picker_result(
        &self,
        slot: &str,
        result: &Value,
    ) -> Result<bool, AttachmentError> {
        let picked = picker::normalize(result).map_err(|e| {
            log::warn!("Unusable picker result for {}: {}", slot, e);
            match e {
                PickerError::MissingHandle => AttachmentError::MissingResource,
                PickerError::Unrecognized(_) => AttachmentError::MissingDescriptor,
            }
        })?;
        self.attach_document(slot, picked).await
    }

    /// Empty an attachment slot
    pub fn remove_document(&self, slot: &str) -> Result<(), AttachmentError> {
        self.update_field(&slot_path(slot)?, Value::Null);
        Ok(())
    }

    /// Run validation over the current state and keep its errors for display
    pub fn validate(&self) -> ValidationResult {
        let result = self.engine.validate(&self.snapshot());
        *lock(&self.errors) = result.errors.clone();
        result
    }

    /// Throw away the current input and its draft
    pub async fn discard(&self) {
        self.debouncer.cancel_and_wait().await;
        self.drafts.clear().await;
        *lock(&self.state) = FormState::template();
        lock(&self.errors).clear();
        self.set_phase(FormPhase::Editing);
    }

    /// Validate, check attachments, and send the application.
    ///
    /// Always works from the latest in-memory state; a pending draft write
    /// does not need to fire first.
    pub async fn submit(&self) -> Result<SubmitOutcome, SubmitError> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubmitError::AlreadySubmitting);
        }
        let _guard = SubmitGuard(&self.submitting);

        let result = self.run_submission().await;
        match &result {
            Ok(SubmitOutcome::Accepted(_)) => self.set_phase(FormPhase::Succeeded),
            Ok(_) => self.set_phase(FormPhase::Failed),
            Err(e) => {
                *lock(&self.last_error) = Some(e.to_string());
                self.set_phase(FormPhase::Failed);
            }
        }
        result
    }

    async fn run_submission(&self) -> Result<SubmitOutcome, SubmitError> {
        self.set_phase(FormPhase::Validating);
        let snapshot = self.snapshot();

        let validation = self.engine.validate(&snapshot);
        *lock(&self.errors) = validation.errors.clone();
        if !validation.is_valid {
            log::info!(
                "Session {}: submission blocked by {} field error(s)",
                self.session_id,
                validation.errors.len()
            );
            return Ok(SubmitOutcome::Invalid(validation));
        }

        let documents = match self.check_documents(&snapshot).await {
            Ok(documents) => documents,
            Err((slot, error)) => {
                log::info!("Session {}: {} rejected: {}", self.session_id, slot, error);
                lock(&self.errors).insert(format!("{DOCUMENTS_SECTION}.{slot}"), error.to_string());
                return Ok(SubmitOutcome::AttachmentRejected { slot, error });
            }
        };

        let payload = self.build_payload(&snapshot, documents);
        self.set_phase(FormPhase::Submitting);
        log::info!(
            "Session {}: submitting application with {} document(s)",
            self.session_id,
            payload.documents.len()
        );

        let response = self.transport.submit(&payload).await.map_err(|e| {
            log::error!("Session {}: submission failed: {}", self.session_id, e);
            SubmitError::from(e)
        })?;

        // a pending timer must be gone before the draft is, or it writes it back
        self.debouncer.cancel_and_wait().await;
        self.drafts.clear().await;
        *lock(&self.state) = FormState::template();
        lock(&self.errors).clear();
        *lock(&self.last_error) = None;
        log::info!("Session {}: application accepted", self.session_id);

        Ok(SubmitOutcome::Accepted(response))
    }

    /// Check every attached document concurrently. On failure, names the
    /// first failing slot in slot order.
    async fn check_documents(
        &self,
        snapshot: &FormState,
    ) -> Result<Vec<(String, AttachmentDescriptor)>, (String, AttachmentError)> {
        let mut attached = Vec::new();
        for (slot, value) in snapshot.documents() {
            if value.is_null() {
                continue;
            }
            match serde_json::from_value::<AttachmentDescriptor>(value) {
                Ok(descriptor) => attached.push((slot, descriptor)),
                Err(_) => return Err((slot, AttachmentError::MissingDescriptor)),
            }
        }

        let checks = attached
            .iter()
            .map(|(_, descriptor)| self.attachments.validate(Some(descriptor)));
        let results = join_all(checks).await;

        for ((slot, _), result) in attached.iter().zip(results) {
            if let Err(error) = result {
                return Err((slot.clone(), error));
            }
        }
        Ok(attached)
    }

    fn build_payload(
        &self,
        snapshot: &FormState,
        documents: Vec<(String, AttachmentDescriptor)>,
    ) -> SubmissionPayload {
        let mut form = snapshot.without_documents();
        if let Some(applicant_id) = &self.applicant_id {
            form.insert("applicantId".to_string(), Value::String(applicant_id.clone()));
        }
        form.insert(
            "submissionDate".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let documents = documents
            .into_iter()
            .map(|(slot, descriptor)| DocumentPart {
                mime_type: descriptor
                    .resolved_mime_type()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                file_name: descriptor.name,
                uri: descriptor.uri,
                slot,
            })
            .collect();

        SubmissionPayload {
            form_field: self.form_field.clone(),
            form: Value::Object(form),
            documents,
        }
    }
}
