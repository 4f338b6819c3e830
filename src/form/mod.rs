//! Admission form state
//!
//! The form is a nested JSON mapping with six fixed top-level sections. Every
//! `FormState` is a superset of the empty template: restoring from a draft
//! overlays the stored values onto a fresh template, so no section or field
//! of the template is ever missing.

pub mod path;
pub mod validation;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use validation::{ValidationEngine, ValidationResult};

/// Top-level sections in submission order.
pub const SECTIONS: [&str; 6] = [
    "studentInfo",
    "parentInfo",
    "previousAcademicDetails",
    "admissionDetails",
    "medicalInfo",
    "documents",
];

/// Section holding the attachment slots.
pub const DOCUMENTS_SECTION: &str = "documents";

/// Every attachment slot the form offers.
pub const DOCUMENT_SLOTS: [&str; 6] = [
    "birthCertificate",
    "transferCertificate",
    "previousReportCard",
    "addressProof",
    "passportPhotos",
    "parentIdentityProof",
];

/// Canonical nested form value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormState(Value);

impl FormState {
    /// The empty template every session starts from.
    pub fn template() -> Self {
        Self(json!({
            "studentInfo": {
                "fullName": "",
                "dateOfBirth": "",
                "gender": "",
                "nationality": "",
                "religion": "",
                "address": { "city": "", "state": "", "postalCode": "" }
            },
            "parentInfo": {
                "firstName": "",
                "lastName": "",
                "contactNumber": "",
                "emailAddress": "",
                "occupation": ""
            },
            "previousAcademicDetails": {
                "lastSchoolAttended": "",
                "lastClassCompleted": "",
                "academicPerformanceAttachment": ""
            },
            "admissionDetails": {
                "classForAdmission": "",
                "academicYear": "",
                "preferredSecondLanguage": "",
                "siblingInSchool": {
                    "hasSibling": false,
                    "siblingDetails": { "name": "", "class": "" }
                }
            },
            "medicalInfo": {
                "bloodGroup": "",
                "allergiesOrConditions": "",
                "emergencyContact": { "name": "", "number": "" }
            },
            "documents": {
                "birthCertificate": null,
                "transferCertificate": null,
                "previousReportCard": null,
                "addressProof": null,
                "passportPhotos": null,
                "parentIdentityProof": null
            }
        }))
    }

    /// Overlay `value` onto the template. Keys absent from `value` keep their
    /// template defaults; extra keys in `value` are preserved. Non-object
    /// values where the template has a mapping are ignored.
    pub fn from_value(value: Value) -> Self {
        let mut base = Self::template().0;
        overlay(&mut base, value);
        Self(base)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Value at a dotted path, if present.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path::get(&self.0, path)
    }

    /// New state with the leaf at `path` replaced. Template keys under a
    /// replaced subtree come back with their defaults.
    pub fn with_field(&self, path: &str, value: Value) -> Self {
        Self::from_value(path::set(&self.0, path, value))
    }

    /// The attachment section as a mapping; empty when missing.
    pub fn documents(&self) -> Map<String, Value> {
        self.get(DOCUMENTS_SECTION)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Every section except `documents`, as one JSON object.
    pub fn without_documents(&self) -> Map<String, Value> {
        let mut sections = self.0.as_object().cloned().unwrap_or_default();
        sections.remove(DOCUMENTS_SECTION);
        sections
    }
}

impl Default for FormState {
    fn default() -> Self {
        Self::template()
    }
}

fn overlay(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match base_map.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        // a template mapping is never replaced by a scalar
        (Value::Object(_), _) => {}
        (slot, value) => *slot = value,
    }
}
