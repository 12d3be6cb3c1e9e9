//! Cleanup scanner - rewrites near-JSON generator text into strict JSON
//!
//! Handles the syntax slips language models make most often:
//! trailing commas before `}`/`]`, single-quoted keys and values, and raw
//! newlines or tabs inside string literals. Every rewrite happens outside
//! (or, for escapes, inside) string literals only, so content such as
//! `"a, }"` is never altered.
//!
//! Guarantees:
//! - Deterministic: same input always produces the same output
//! - Idempotent on strict JSON: valid JSON text comes back unchanged

/// Position in source text for fix reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Kind of rewrite applied by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixKind {
    TrailingComma,
    SingleQuotes,
    EscapedControl,
    UnterminatedString,
}

impl std::fmt::Display for FixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FixKind::TrailingComma => write!(f, "removed trailing comma"),
            FixKind::SingleQuotes => write!(f, "converted single-quoted string"),
            FixKind::EscapedControl => write!(f, "escaped control character in string"),
            FixKind::UnterminatedString => write!(f, "closed unterminated string"),
        }
    }
}

/// A single rewrite with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub kind: FixKind,
    pub span: Span,
}

/// Scanner output
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    pub text: String,
    pub fixes: Vec<Fix>,
}

/// Locate the JSON payload inside surrounding prose or code fences.
///
/// Same as the first entry of [`json_spans`].
pub fn extract_json_span(text: &str) -> Option<&str> {
    json_spans(text).into_iter().next()
}

/// Candidate JSON payloads, most likely first.
///
/// The object span runs from the first `{` to the last `}`; the array span
/// from the first `[` to the last `]`. The object span comes first unless the
/// array span encloses it, so brackets in surrounding prose never hide an
/// object while a top-level array of nodes is still taken whole.
pub fn json_spans(text: &str) -> Vec<&str> {
    let span = |open: char, close: char| {
        let start = text.find(open)?;
        let end = text.rfind(close)?;
        (end > start).then_some((start, end))
    };
    let object = span('{', '}');
    let array = span('[', ']');

    let ordered = match (object, array) {
        (Some(o), Some(a)) if a.0 < o.0 && a.1 > o.1 => vec![a, o],
        (Some(o), Some(a)) => vec![o, a],
        (Some(o), None) => vec![o],
        (None, Some(a)) => vec![a],
        (None, None) => Vec::new(),
    };
    ordered.into_iter().map(|(start, end)| &text[start..=end]).collect()
}

/// Tokenizer-style scanner over near-JSON text
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Tokenizer {
    /// Create a new scanner for the given text
    pub fn new(text: &str) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Rewrite the whole input into strict JSON where possible
    pub fn clean(mut self) -> Cleaned {
        let mut out = String::with_capacity(self.input.len());
        let mut fixes = Vec::new();

        while let Some(ch) = self.peek() {
            match ch {
                '"' => self.copy_string(&mut out, '"', &mut fixes),
                '\'' => {
                    fixes.push(Fix {
                        kind: FixKind::SingleQuotes,
                        span: self.current_span(),
                    });
                    self.copy_string(&mut out, '\'', &mut fixes);
                }
                ',' if self.next_significant_is_closer() => {
                    fixes.push(Fix {
                        kind: FixKind::TrailingComma,
                        span: self.current_span(),
                    });
                    self.advance();
                }
                _ => {
                    out.push(ch);
                    self.advance();
                }
            }
        }

        Cleaned { text: out, fixes }
    }

    // ── Character helpers ──────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    /// Whether the first non-whitespace char after the current comma closes
    /// an object or array
    fn next_significant_is_closer(&self) -> bool {
        self.input[self.position + 1..]
            .iter()
            .find(|c| !c.is_whitespace())
            .is_some_and(|c| *c == '}' || *c == ']')
    }

    // ── String literals ────────────────────────────────────

    /// Copy a string literal delimited by `quote`, always emitting a
    /// double-quoted JSON string.
    fn copy_string(&mut self, out: &mut String, quote: char, fixes: &mut Vec<Fix>) {
        self.advance();
        out.push('"');

        loop {
            let span = self.current_span();
            match self.advance() {
                None => {
                    fixes.push(Fix {
                        kind: FixKind::UnterminatedString,
                        span,
                    });
                    out.push('"');
                    return;
                }
                Some(c) if c == quote => {
                    out.push('"');
                    return;
                }
                Some('\\') => match self.advance() {
                    // \' is not a JSON escape
                    Some('\'') => out.push('\''),
                    Some(escaped) => {
                        out.push('\\');
                        out.push(escaped);
                    }
                    None => {
                        out.push('"');
                        return;
                    }
                },
                Some('"') => {
                    // only reachable inside a single-quoted literal
                    out.push_str("\\\"");
                }
                Some(c) if c.is_control() => {
                    fixes.push(Fix {
                        kind: FixKind::EscapedControl,
                        span,
                    });
                    match c {
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        other => out.push_str(&format!("\\u{:04x}", other as u32)),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(text: &str) -> Cleaned {
        Tokenizer::new(text).clean()
    }

    #[test]
    fn test_strict_json_unchanged() {
        let text = r#"{"components":[{"type":"FloatingCard","props":{"color":"blue"}}]}"#;
        let result = clean(text);
        assert_eq!(result.text, text);
        assert!(result.fixes.is_empty());
    }

    #[test]
    fn test_trailing_comma_before_brace() {
        let result = clean(r#"{"a":1,}"#);
        assert_eq!(result.text, r#"{"a":1}"#);
        assert_eq!(result.fixes[0].kind, FixKind::TrailingComma);
        assert_eq!(result.fixes[0].span.column, 7);
    }

    #[test]
    fn test_trailing_comma_before_bracket_with_whitespace() {
        let result = clean("[1, 2,\n  ]");
        assert_eq!(result.text, "[1, 2\n  ]");
    }

    #[test]
    fn test_comma_inside_string_untouched() {
        let text = r#"{"text":"a, }"}"#;
        assert_eq!(clean(text).text, text);
    }

    #[test]
    fn test_single_quoted_keys_and_values() {
        let result = clean("{'type': 'FloatingText', 'props': {}}");
        assert_eq!(result.text, r#"{"type": "FloatingText", "props": {}}"#);
        assert_eq!(
            result
                .fixes
                .iter()
                .filter(|f| f.kind == FixKind::SingleQuotes)
                .count(),
            3
        );
    }

    #[test]
    fn test_single_quoted_value_with_double_quote_inside() {
        let result = clean(r#"{'text': 'say "hi"'}"#);
        assert_eq!(result.text, r#"{"text": "say \"hi\""}"#);
        let parsed: serde_json::Value = serde_json::from_str(&result.text).unwrap();
        assert_eq!(parsed["text"], "say \"hi\"");
    }

    #[test]
    fn test_escaped_apostrophe_in_single_quotes() {
        let result = clean(r"{'text': 'l\'addition'}");
        let parsed: serde_json::Value = serde_json::from_str(&result.text).unwrap();
        assert_eq!(parsed["text"], "l'addition");
    }

    #[test]
    fn test_apostrophe_inside_double_quotes_kept() {
        let text = r#"{"text":"l'addition"}"#;
        assert_eq!(clean(text).text, text);
    }

    #[test]
    fn test_raw_newline_in_string_escaped() {
        let result = clean("{\"text\":\"line1\nline2\"}");
        assert_eq!(result.text, "{\"text\":\"line1\\nline2\"}");
        assert_eq!(result.fixes[0].kind, FixKind::EscapedControl);
    }

    #[test]
    fn test_unterminated_string_closed() {
        let result = clean("\"abc");
        assert_eq!(result.text, "\"abc\"");
        assert_eq!(result.fixes[0].kind, FixKind::UnterminatedString);
    }

    #[test]
    fn test_extract_span_from_prose() {
        let text = "Here is the JSON:\n```json\n{\"components\": []}\n```\nEnjoy!";
        assert_eq!(extract_json_span(text), Some("{\"components\": []}"));
    }

    #[test]
    fn test_extract_span_array() {
        assert_eq!(extract_json_span("x [1, {\"a\": 2}] y"), Some("[1, {\"a\": 2}]"));
    }

    #[test]
    fn test_spans_prefer_object_over_prose_brackets() {
        let text = "Réponse [JSON] : {\"components\": [1]}";
        assert_eq!(
            json_spans(text),
            vec!["{\"components\": [1]}", "[JSON] : {\"components\": [1]"]
        );
    }

    #[test]
    fn test_spans_enclosing_array_first() {
        let spans = json_spans("[{\"a\": 1}, {\"b\": 2}]");
        assert_eq!(spans[0], "[{\"a\": 1}, {\"b\": 2}]");
        assert_eq!(spans[1], "{\"a\": 1}, {\"b\": 2}");
    }

    #[test]
    fn test_extract_span_none() {
        assert_eq!(extract_json_span("no json here"), None);
        assert_eq!(extract_json_span("} {"), None);
    }

    #[test]
    fn test_clean_determinism_100_iterations() {
        let text = "{'a': [1, 2,], 'b': 'x',}";
        let first = clean(text);
        for i in 0..100 {
            assert_eq!(first, clean(text), "Non-determinism at iteration {}", i);
        }
    }
}
