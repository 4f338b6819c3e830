//! Field-level validation of a complete form snapshot
//!
//! Validation is a pure function of the snapshot and the evaluation date:
//! the same input always yields the same `ValidationResult`, and every call
//! builds its error map from scratch.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FormState;

pub const REQUIRED_MESSAGE: &str = "This field is required";
pub const SIBLING_NAME_MESSAGE: &str = "Sibling name is required";
pub const SIBLING_CLASS_MESSAGE: &str = "Sibling class is required";
pub const INVALID_EMAIL_MESSAGE: &str = "Invalid email address";
pub const INVALID_PHONE_MESSAGE: &str = "Invalid phone number";
pub const INVALID_DATE_MESSAGE: &str = "Invalid date";
pub const FUTURE_DATE_MESSAGE: &str = "Date of Birth cannot be in the future";

/// Required field paths, relative to their section.
pub const REQUIRED_FIELDS: [(&str, &[&str]); 6] = [
    (
        "studentInfo",
        &[
            "fullName",
            "dateOfBirth",
            "gender",
            "nationality",
            "address.city",
            "address.state",
            "address.postalCode",
            "religion",
        ],
    ),
    (
        "parentInfo",
        &["firstName", "lastName", "contactNumber", "emailAddress", "occupation"],
    ),
    (
        "previousAcademicDetails",
        &["lastSchoolAttended", "lastClassCompleted"],
    ),
    (
        "admissionDetails",
        &[
            "classForAdmission",
            "academicYear",
            "preferredSecondLanguage",
            "siblingInSchool.hasSibling",
        ],
    ),
    (
        "medicalInfo",
        &[
            "bloodGroup",
            "emergencyContact.name",
            "emergencyContact.number",
            "allergiesOrConditions",
        ],
    ),
    (
        "documents",
        &["birthCertificate", "previousReportCard", "passportPhotos"],
    ),
];

const HAS_SIBLING: &str = "admissionDetails.siblingInSchool.hasSibling";
const SIBLING_NAME: &str = "admissionDetails.siblingInSchool.siblingDetails.name";
const SIBLING_CLASS: &str = "admissionDetails.siblingInSchool.siblingDetails.class";
const EMAIL: &str = "parentInfo.emailAddress";
const PHONE_FIELDS: [&str; 2] = ["parentInfo.contactNumber", "medicalInfo.emergencyContact.number"];
const DATE_OF_BIRTH: &str = "studentInfo.dateOfBirth";

/// Outcome of one validation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Full dotted path to message.
    pub errors: BTreeMap<String, String>,
}

impl ValidationResult {
    fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Stateless validator over [`FormState`] snapshots.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationEngine;

impl ValidationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate against the current UTC date.
    pub fn validate(&self, state: &FormState) -> ValidationResult {
        self.validate_at(state, Utc::now())
    }

    /// Validate with an explicit evaluation instant.
    pub fn validate_at(&self, state: &FormState, now: DateTime<Utc>) -> ValidationResult {
        let mut errors = BTreeMap::new();

        for (section, fields) in REQUIRED_FIELDS {
            for field in fields {
                let full_path = format!("{section}.{field}");
                if is_empty(state.get(&full_path)) {
                    errors.insert(full_path, REQUIRED_MESSAGE.to_string());
                }
            }
        }

        if state.get(HAS_SIBLING) == Some(&Value::Bool(true)) {
            if is_empty(state.get(SIBLING_NAME)) {
                errors.insert(SIBLING_NAME.to_string(), SIBLING_NAME_MESSAGE.to_string());
            }
            if is_empty(state.get(SIBLING_CLASS)) {
                errors.insert(SIBLING_CLASS.to_string(), SIBLING_CLASS_MESSAGE.to_string());
            }
        }

        if let Some(value) = present(state.get(EMAIL)) {
            if !matches_trimmed(value, email_pattern()) {
                errors.insert(EMAIL.to_string(), INVALID_EMAIL_MESSAGE.to_string());
            }
        }

        for field in PHONE_FIELDS {
            if let Some(value) = present(state.get(field)) {
                if !matches_trimmed(value, phone_pattern()) {
                    errors.insert(field.to_string(), INVALID_PHONE_MESSAGE.to_string());
                }
            }
        }

        if let Some(value) = present(state.get(DATE_OF_BIRTH)) {
            match value.as_str().and_then(parse_birth_date) {
                None => {
                    errors.insert(DATE_OF_BIRTH.to_string(), INVALID_DATE_MESSAGE.to_string());
                }
                Some(date) if date.is_after(now) => {
                    errors.insert(DATE_OF_BIRTH.to_string(), FUTURE_DATE_MESSAGE.to_string());
                }
                Some(_) => {}
            }
        }

        ValidationResult::from_errors(errors)
    }
}

/// Missing, null, or a string that is blank after trimming.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    if is_empty(value) {
        None
    } else {
        value
    }
}

fn matches_trimmed(value: &Value, pattern: &Regex) -> bool {
    value
        .as_str()
        .map(|s| pattern.is_match(s.trim()))
        .unwrap_or(false)
}

fn email_pattern() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

fn phone_pattern() -> &'static Regex {
    static PHONE_RE: OnceLock<Regex> = OnceLock::new();
    PHONE_RE.get_or_init(|| Regex::new(r"^\+?[1-9][0-9]{1,14}$").expect("valid phone regex"))
}

enum BirthDate {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl BirthDate {
    /// Calendar days compare against today's UTC date; timestamps compare
    /// as instants.
    fn is_after(&self, now: DateTime<Utc>) -> bool {
        match self {
            BirthDate::Day(date) => *date > now.date_naive(),
            BirthDate::Instant(instant) => *instant > now,
        }
    }
}

/// Accepts a plain `YYYY-MM-DD` date or a full RFC 3339 timestamp.
fn parse_birth_date(raw: &str) -> Option<BirthDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(BirthDate::Day(date));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| BirthDate::Instant(dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn complete_form() -> FormState {
        let descriptor = json!({
            "name": "doc.pdf",
            "uri": "file:///tmp/doc.pdf",
            "mimeType": "application/pdf",
            "sizeBytes": 1024
        });
        [
            ("studentInfo.fullName", json!("Asha Rao")),
            ("studentInfo.dateOfBirth", json!("2015-04-12")),
            ("studentInfo.gender", json!("Female")),
            ("studentInfo.nationality", json!("Indian")),
            ("studentInfo.religion", json!("Hindu")),
            ("studentInfo.address.city", json!("Pune")),
            ("studentInfo.address.state", json!("MH")),
            ("studentInfo.address.postalCode", json!("411001")),
            ("parentInfo.firstName", json!("Vikram")),
            ("parentInfo.lastName", json!("Rao")),
            ("parentInfo.contactNumber", json!("+919812345678")),
            ("parentInfo.emailAddress", json!("vikram@example.com")),
            ("parentInfo.occupation", json!("Engineer")),
            ("previousAcademicDetails.lastSchoolAttended", json!("Little Oaks")),
            ("previousAcademicDetails.lastClassCompleted", json!("Class 3")),
            ("admissionDetails.classForAdmission", json!("Class 4")),
            ("admissionDetails.academicYear", json!("2025-2026")),
            ("admissionDetails.preferredSecondLanguage", json!("Hindi")),
            ("medicalInfo.bloodGroup", json!("B+")),
            ("medicalInfo.allergiesOrConditions", json!("None")),
            ("medicalInfo.emergencyContact.name", json!("Meera Rao")),
            ("medicalInfo.emergencyContact.number", json!("9822012345")),
            ("documents.birthCertificate", descriptor.clone()),
            ("documents.previousReportCard", descriptor.clone()),
            ("documents.passportPhotos", descriptor),
        ]
        .into_iter()
        .fold(FormState::template(), |state, (path, value)| state.with_field(path, value))
    }

    #[test]
    fn test_complete_form_is_valid() {
        let result = ValidationEngine::new().validate_at(&complete_form(), now());
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_template_reports_every_required_field() {
        let result = ValidationEngine::new().validate_at(&FormState::template(), now());
        let expected: usize = REQUIRED_FIELDS.iter().map(|(_, fields)| fields.len()).sum();
        // hasSibling defaults to false, which counts as filled in
        assert_eq!(result.errors.len(), expected - 1);
        assert!(!result.is_valid);
        assert_eq!(
            result.errors.get("studentInfo.address.city").map(String::as_str),
            Some(REQUIRED_MESSAGE)
        );
        assert!(result.errors.contains_key("documents.passportPhotos"));
        assert!(!result.errors.contains_key(HAS_SIBLING));
    }

    #[test]
    fn test_whitespace_counts_as_empty() {
        let state = complete_form().with_field("parentInfo.occupation", json!("   "));
        let result = ValidationEngine::new().validate_at(&state, now());
        assert_eq!(
            result.errors.keys().collect::<Vec<_>>(),
            vec!["parentInfo.occupation"]
        );
    }

    #[test]
    fn test_sibling_fields_only_required_with_sibling() {
        let engine = ValidationEngine::new();
        let without = engine.validate_at(&complete_form(), now());
        assert!(without.is_valid);

        let with = engine.validate_at(
            &complete_form().with_field(HAS_SIBLING, json!(true)),
            now(),
        );
        let new_keys: Vec<&String> = with.errors.keys().collect();
        assert_eq!(new_keys, vec![SIBLING_CLASS, SIBLING_NAME]);
        assert_eq!(with.errors[SIBLING_NAME], SIBLING_NAME_MESSAGE);
    }

    #[test]
    fn test_email_format() {
        let engine = ValidationEngine::new();
        for bad in ["vikram", "vikram@example", "vik ram@example.com", "@example.com"] {
            let state = complete_form().with_field(EMAIL, json!(bad));
            let result = engine.validate_at(&state, now());
            assert_eq!(result.errors.get(EMAIL).map(String::as_str), Some(INVALID_EMAIL_MESSAGE), "{bad}");
        }
        let padded = complete_form().with_field(EMAIL, json!("  vikram@example.com "));
        assert!(engine.validate_at(&padded, now()).is_valid);
    }

    #[test]
    fn test_phone_format() {
        let engine = ValidationEngine::new();
        for bad in ["0123456789", "+0123", "1", "98-220-12345", "+1234567890123456"] {
            let state = complete_form().with_field("parentInfo.contactNumber", json!(bad));
            let result = engine.validate_at(&state, now());
            assert_eq!(
                result.errors.get("parentInfo.contactNumber").map(String::as_str),
                Some(INVALID_PHONE_MESSAGE),
                "{bad}"
            );
        }
        for good in ["12", "+44", "123456789012345", "+919812345678"] {
            let state = complete_form().with_field("medicalInfo.emergencyContact.number", json!(good));
            assert!(engine.validate_at(&state, now()).is_valid, "{good}");
        }
    }

    #[test]
    fn test_numeric_phone_value_is_rejected() {
        let state = complete_form().with_field("parentInfo.contactNumber", json!(9812345678u64));
        let result = ValidationEngine::new().validate_at(&state, now());
        assert!(result.errors.contains_key("parentInfo.contactNumber"));
    }

    #[test]
    fn test_date_of_birth_rules() {
        let engine = ValidationEngine::new();

        let future = complete_form().with_field(DATE_OF_BIRTH, json!("2025-06-02"));
        assert_eq!(
            engine.validate_at(&future, now()).errors.get(DATE_OF_BIRTH).map(String::as_str),
            Some(FUTURE_DATE_MESSAGE)
        );

        let today = complete_form().with_field(DATE_OF_BIRTH, json!("2025-06-01"));
        assert!(engine.validate_at(&today, now()).is_valid);

        let timestamp = complete_form().with_field(DATE_OF_BIRTH, json!("2015-04-12T00:00:00Z"));
        assert!(engine.validate_at(&timestamp, now()).is_valid);

        let garbage = complete_form().with_field(DATE_OF_BIRTH, json!("2015-02-30"));
        assert_eq!(
            engine.validate_at(&garbage, now()).errors.get(DATE_OF_BIRTH).map(String::as_str),
            Some(INVALID_DATE_MESSAGE)
        );
    }

    #[test]
    fn test_timestamp_date_of_birth_compares_instants() {
        let engine = ValidationEngine::new();
        let future_message = Some(FUTURE_DATE_MESSAGE);

        // same calendar day, a few hours ahead of now
        let later_today = complete_form().with_field(DATE_OF_BIRTH, json!("2025-06-01T18:00:00Z"));
        assert_eq!(
            engine.validate_at(&later_today, now()).errors.get(DATE_OF_BIRTH).map(String::as_str),
            future_message
        );

        // still June 1st locally, but June 2nd in UTC
        let offset = complete_form().with_field(DATE_OF_BIRTH, json!("2025-06-01T20:00:00-05:00"));
        assert_eq!(
            engine.validate_at(&offset, now()).errors.get(DATE_OF_BIRTH).map(String::as_str),
            future_message
        );

        let earlier_today = complete_form().with_field(DATE_OF_BIRTH, json!("2025-06-01T08:00:00+02:00"));
        assert!(engine.validate_at(&earlier_today, now()).is_valid);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let engine = ValidationEngine::new();
        let state = FormState::template().with_field(EMAIL, json!("nope"));
        assert_eq!(engine.validate_at(&state, now()), engine.validate_at(&state, now()));
    }
}
