//! Core data models used throughout QA Harness.
//!
//! These types represent the sessions, document units, passages, and test
//! cases that flow through the ingestion and generation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RagError;

/// Maximum accepted session token length.
const MAX_SESSION_ID_LEN: usize = 128;

/// Validated, opaque session token.
///
/// A session owns exactly one vector collection (named
/// [`collection_name`](SessionId::collection_name)) and one asset directory
/// named after the token, so the token is restricted to characters that are
/// safe in both places.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> Result<Self, RagError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RagError::InvalidSession(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic collection name: `session_{id}`.
    pub fn collection_name(&self) -> String {
        format!("session_{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a unit came from an ordinary document or raw HTML markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Document,
    HtmlSource,
}

/// Metadata attached to every unit and inherited by its passages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// Uploaded filename.
    pub source: String,
    pub session_id: String,
    pub kind: UnitKind,
    /// 1-based page number for paginated formats (PDF).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl UnitMetadata {
    pub fn new(source: &str, session: &SessionId, kind: UnitKind) -> Self {
        Self {
            source: source.to_string(),
            session_id: session.as_str().to_string(),
            kind,
            page: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// One logical source document after format-specific loading.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUnit {
    pub text: String,
    pub metadata: UnitMetadata,
}

/// A size-bounded slice of a [`DocumentUnit`]'s text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    /// Position of this passage within its unit, starting at 0.
    pub index: usize,
    /// Character offset of the passage start within the unit text.
    pub start: usize,
    pub metadata: UnitMetadata,
}

/// Positive or negative test.
///
/// Models write this field in assorted letter cases; all are accepted and
/// the lower-case form is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Positive,
    Negative,
}

impl<'de> Deserialize<'de> for TestType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(TestType::Positive),
            "negative" => Ok(TestType::Negative),
            _ => Err(serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(&raw),
                &"\"positive\" or \"negative\"",
            )),
        }
    }
}

/// A structured software test case grounded in an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub test_id: String,
    pub feature: String,
    pub test_scenario: String,
    pub expected_result: String,
    pub test_type: TestType,
    /// Source filename the case was derived from.
    pub grounded_in: String,
}

/// Default reported when a caller-supplied test case has no usable `test_id`.
pub const UNKNOWN_TEST_ID: &str = "unknown";

/// Read an optional string field from a caller-supplied test case.
///
/// Only JSON strings count; numbers, objects, and `null` are treated as
/// absent rather than coerced.
pub fn str_field<'a>(test_case: &'a Value, key: &str) -> Option<&'a str> {
    test_case.get(key).and_then(Value::as_str)
}

/// The test case's `test_id`, or [`UNKNOWN_TEST_ID`].
pub fn test_id_of(test_case: &Value) -> &str {
    str_field(test_case, "test_id").unwrap_or(UNKNOWN_TEST_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_id_accepts_safe_tokens() {
        let id = SessionId::parse("a1b2-c3_d4").unwrap();
        assert_eq!(id.collection_name(), "session_a1b2-c3_d4");
    }

    #[test]
    fn session_id_rejects_unsafe_tokens() {
        let too_long = "a".repeat(129);
        for raw in ["", "../etc", "a b", "x/y", "sess.1", too_long.as_str()] {
            assert!(
                matches!(SessionId::parse(raw), Err(RagError::InvalidSession(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_type_accepts_any_case() {
        let t: TestType = serde_json::from_value(json!("Positive")).unwrap();
        assert_eq!(t, TestType::Positive);
        let t: TestType = serde_json::from_value(json!("NEGATIVE")).unwrap();
        assert_eq!(t, TestType::Negative);
        assert!(serde_json::from_value::<TestType>(json!("neutral")).is_err());
        assert_eq!(serde_json::to_value(TestType::Negative).unwrap(), json!("negative"));
    }

    #[test]
    fn metadata_serializes_kind_snake_case() {
        let session = SessionId::parse("s1").unwrap();
        let meta = UnitMetadata::new("checkout.html", &session, UnitKind::HtmlSource);
        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["kind"], "html_source");
        assert_eq!(v["session_id"], "s1");
        assert!(v.get("page").is_none());
    }

    #[test]
    fn test_id_defaults_to_unknown() {
        assert_eq!(test_id_of(&json!({"test_id": "TC-7"})), "TC-7");
        assert_eq!(test_id_of(&json!({"feature": "cart"})), "unknown");
        assert_eq!(test_id_of(&json!({"test_id": 7})), "unknown");
    }
}
