// Campus Admissions - admission form draft, validation and submission engine

pub mod attachment;
pub mod config;
pub mod controller;
pub mod form;
pub mod storage;
pub mod transport;

pub use attachment::{AttachmentDescriptor, AttachmentError, AttachmentValidator, FileMetadata};
pub use config::AdmissionConfig;
pub use controller::{FormPhase, FormStateController, SubmitError, SubmitOutcome};
pub use form::{FormState, ValidationEngine, ValidationResult};
pub use storage::{DraftStore, KeyValueStore};
pub use transport::{HttpTransport, SubmissionPayload, Transport, TransportError};
