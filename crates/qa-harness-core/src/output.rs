//! Model-output cleanup: fence stripping and test-case parsing.
//!
//! Models often wrap structured output in a markdown code fence even when
//! told not to. The accepted shape is:
//!
//! ```text
//! output   := ws* ( fenced | bare ) ws*
//! fenced   := "```" [tag] ( "\n" body | body ) "```"
//! tag      := "json" | "python" | [A-Za-z0-9+#._-]+   (first line only)
//! ```
//!
//! Anything else passes through trimmed but otherwise unchanged. There is no
//! best-effort salvage: prose around a JSON payload makes the test-case
//! parse fail with [`RagError::GenerationParse`].

use serde_json::Value;

use crate::error::RagError;
use crate::models::TestCase;

const FENCE: &str = "```";

/// Tags recognised even when the payload follows on the same line.
const KNOWN_TAGS: [&str; 2] = ["json", "python"];

/// A fenced block split into its optional language tag and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fenced<'a> {
    pub language: Option<&'a str>,
    pub body: &'a str,
}

/// Parse `text` as a single fenced block, if it is one.
pub fn split_fence(text: &str) -> Option<Fenced<'_>> {
    let inner = text.trim().strip_prefix(FENCE)?.strip_suffix(FENCE)?;

    if let Some((first, body)) = inner.split_once('\n') {
        let tag = first.trim();
        if tag.is_empty() {
            return Some(Fenced {
                language: None,
                body: body.trim(),
            });
        }
        if is_tag(tag) {
            return Some(Fenced {
                language: Some(tag),
                body: body.trim(),
            });
        }
    }

    for tag in KNOWN_TAGS {
        if let Some(prefix) = inner.get(..tag.len()) {
            let rest = &inner[tag.len()..];
            let boundary = rest.chars().next().map_or(true, |c| !c.is_alphanumeric());
            if prefix.eq_ignore_ascii_case(tag) && boundary {
                return Some(Fenced {
                    language: Some(prefix),
                    body: rest.trim(),
                });
            }
        }
    }

    Some(Fenced {
        language: None,
        body: inner.trim(),
    })
}

fn is_tag(s: &str) -> bool {
    s.len() <= 20
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '.' | '_' | '-'))
}

/// Remove one wrapping code fence if present; always trims.
pub fn strip_fences(text: &str) -> &str {
    split_fence(text).map_or_else(|| text.trim(), |f| f.body)
}

/// Clean a generated script. No syntax validation is performed.
pub fn clean_script(raw: &str) -> String {
    strip_fences(raw).to_string()
}

/// Parse model output into test cases.
///
/// A single JSON object becomes a one-element list; an array is returned
/// as-is (after each element is validated). Anything else fails with
/// [`RagError::GenerationParse`] carrying the raw output.
pub fn parse_test_cases(raw: &str) -> Result<Vec<TestCase>, RagError> {
    let parse_error = |reason: String| RagError::GenerationParse {
        reason,
        raw: raw.to_string(),
    };

    let value: Value = serde_json::from_str(strip_fences(raw))
        .map_err(|e| parse_error(format!("invalid JSON: {}", e)))?;

    let items = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items,
        other => {
            return Err(parse_error(format!(
                "expected a JSON object or array, got {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<TestCase>(item)
                .map_err(|e| parse_error(format!("element {} is not a test case: {}", i, e)))
        })
        .collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestType;

    const CASE: &str = r#"{"test_id": "TC-001", "feature": "Discount", "test_scenario": "Apply SAVE15", "expected_result": "15% off", "test_type": "Positive", "grounded_in": "product_specs.md"}"#;

    #[test]
    fn strips_tagged_and_generic_fences_identically() {
        let payload = "[1, 2, 3]";
        let bare = strip_fences(payload);
        for wrapped in [
            format!("```json\n{}\n```", payload),
            format!("```python\n{}\n```", payload),
            format!("```\n{}\n```", payload),
            format!("  ```JSON\n{}\n```\n", payload),
            format!("```json{}```", payload),
        ] {
            assert_eq!(strip_fences(&wrapped), bare, "{:?}", wrapped);
        }
    }

    #[test]
    fn reports_language_tag() {
        let f = split_fence("```python\nprint('hi')\n```").unwrap();
        assert_eq!(f.language, Some("python"));
        assert_eq!(f.body, "print('hi')");
        assert!(split_fence("print('hi')").is_none());
    }

    #[test]
    fn unterminated_fence_passes_through() {
        let text = "```json\n{\"a\": 1}";
        assert_eq!(strip_fences(text), text);
    }

    #[test]
    fn single_object_is_wrapped_in_list() {
        let cases = parse_test_cases(CASE).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].test_id, "TC-001");
        assert_eq!(cases[0].test_type, TestType::Positive);
    }

    #[test]
    fn array_is_returned_unchanged() {
        let raw = format!("```json\n[{}, {}]\n```", CASE, CASE.replace("TC-001", "TC-002"));
        let cases = parse_test_cases(&raw).unwrap();
        let ids: Vec<&str> = cases.iter().map(|c| c.test_id.as_str()).collect();
        assert_eq!(ids, vec!["TC-001", "TC-002"]);
        assert!(parse_test_cases("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_output_is_a_parse_error_with_raw_text() {
        let raw = "Sure! Here are some test cases: ...";
        match parse_test_cases(raw) {
            Err(RagError::GenerationParse { raw: r, .. }) => assert_eq!(r, raw),
            other => panic!("expected GenerationParse, got {:?}", other),
        }
    }

    #[test]
    fn prose_around_json_is_not_salvaged() {
        let raw = format!("Here you go:\n```json\n{}\n```", CASE);
        assert!(matches!(
            parse_test_cases(&raw),
            Err(RagError::GenerationParse { .. })
        ));
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        for raw in ["42", "\"text\"", "[1, 2]", r#"{"test_id": "only"}"#] {
            assert!(
                matches!(parse_test_cases(raw), Err(RagError::GenerationParse { .. })),
                "accepted {}",
                raw
            );
        }
    }

    #[test]
    fn script_is_unfenced_but_not_validated() {
        let raw = "```python\nimport selenium\nthis is not python(\n```";
        assert_eq!(clean_script(raw), "import selenium\nthis is not python(");
    }
}
