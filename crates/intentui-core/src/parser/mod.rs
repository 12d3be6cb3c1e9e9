//! Lenient parser - generator text to `serde_json::Value`
//!
//! Strict JSON is tried first. When that fails, the payload is cut out of
//! any surrounding prose and passed through the cleanup scanner before a
//! second strict parse. A failure here is the only condition that triggers
//! model-based escalation.

pub mod ast;
pub mod tokenizer;

use serde_json::Value;

use crate::{Error, Result};
use tokenizer::{json_spans, Fix, Tokenizer};

/// Parse generator text into a JSON value
///
/// # Guarantees
/// - Deterministic: same input always produces the same value
/// - Strict JSON input parses exactly as `serde_json` would
///
/// # Errors
/// Returns `ParseError` when no JSON payload can be recovered.
pub fn parse_lenient(text: &str) -> Result<Value> {
    parse_lenient_with_fixes(text).map(|(value, _)| value)
}

/// Same as [`parse_lenient`], also reporting the cleanup rewrites applied
pub fn parse_lenient_with_fixes(text: &str) -> Result<(Value, Vec<Fix>)> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::ParseError("empty generator output".into()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok((value, Vec::new()));
    }

    let spans = json_spans(trimmed);
    if spans.is_empty() {
        return Err(Error::ParseError("no JSON object or array found".into()));
    }

    let mut last_error = None;
    for span in spans {
        let cleaned = Tokenizer::new(span).clean();
        match serde_json::from_str::<Value>(&cleaned.text) {
            Ok(value) => return Ok((value, cleaned.fixes)),
            Err(e) => last_error = Some(e),
        }
    }
    Err(Error::ParseError(format!(
        "unrecoverable JSON after cleanup: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_strict_json() {
        let value = parse_lenient(r#"{"components": []}"#).unwrap();
        assert_eq!(value, json!({"components": []}));
    }

    #[test]
    fn test_parse_trailing_comma() {
        let value =
            parse_lenient(r#"{"components":[{"type":"Card","props":{"color":"blue"},}]}"#).unwrap();
        assert_eq!(value["components"][0]["type"], "Card");
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let text = "Sure! Here you go:\n```json\n{'components': [{'type': 'FloatingText', 'props': {},},],}\n```";
        let (value, fixes) = parse_lenient_with_fixes(text).unwrap();
        assert_eq!(value["components"][0]["type"], "FloatingText");
        assert!(!fixes.is_empty());
    }

    #[test]
    fn test_parse_top_level_array() {
        let value = parse_lenient(r#"[{"type":"A","props":{}},]"#).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn test_parse_brackets_in_prose_before_object() {
        let text = "Voici l'interface [version 2] :\n{\"components\": [{\"type\": \"FloatingCard\", \"props\": {\"color\": \"blue\"},}]}";
        let value = parse_lenient(text).unwrap();
        assert_eq!(value["components"][0]["type"], "FloatingCard");

        let value = parse_lenient("Réponse [JSON] : {'components': []}").unwrap();
        assert_eq!(value, json!({"components": []}));
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(matches!(parse_lenient("   "), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_parse_plain_prose_fails() {
        assert!(parse_lenient("I cannot help with that").is_err());
    }

    #[test]
    fn test_parse_truncated_object_fails() {
        assert!(parse_lenient(r#"{"components": [{"type": "FloatingCard", "props": {"#).is_err());
    }

    #[test]
    fn test_parse_determinism_100_iterations() {
        let text = "{'components': [{'type': 'FloatingText',},]}";
        let first = parse_lenient(text).unwrap();
        for i in 0..100 {
            assert_eq!(first, parse_lenient(text).unwrap(), "Non-determinism at iteration {}", i);
        }
    }
}
