//! Structure validator - checks arbitrary JSON against the component schema
//!
//! Two layers:
//!
//! - [`is_valid_tree`] / [`is_valid_node`]: pure, total predicates. They
//!   never panic and return `false` on any shape mismatch.
//! - [`validate`]: the same rules, accumulating every diagnostic with its
//!   JSON path instead of stopping at the first mismatch. Warnings (unknown
//!   component types, non-canonical vocabulary) never make a tree invalid.
//!
//! Recursion is capped at [`MAX_DEPTH`]; anything deeper is invalid.

use serde_json::Value;

use crate::renderer::registry::ComponentKind;
use crate::vocabulary;

/// Maximum node nesting accepted by the validator and produced by the repairer
pub const MAX_DEPTH: usize = 64;

// ── Predicates ────────────────────────────────────────────

/// Whether `value` is `{components: [valid node, ...]}`
pub fn is_valid_tree(value: &Value) -> bool {
    value
        .get("components")
        .and_then(Value::as_array)
        .is_some_and(|components| components.iter().all(is_valid_node))
}

/// Whether `value` is a valid node, children checked recursively
pub fn is_valid_node(value: &Value) -> bool {
    is_valid_node_at(value, 1)
}

fn is_valid_node_at(value: &Value, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    let Some(obj) = value.as_object() else {
        return false;
    };
    if !obj
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty())
    {
        return false;
    }
    if !obj.get("props").is_some_and(Value::is_object) {
        return false;
    }
    match obj.get("children") {
        None => true,
        Some(Value::Array(children)) => children
            .iter()
            .all(|child| child.is_string() || is_valid_node_at(child, depth + 1)),
        Some(_) => false,
    }
}

// ── Diagnostics ───────────────────────────────────────────

/// Result of validation - accumulates all diagnostics
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no errors were found (warnings are OK)
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Returns only error-level diagnostics
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    /// Returns only warning-level diagnostics
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    fn add_error(&mut self, kind: DiagnosticKind, path: &str, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            kind,
            path: path.to_string(),
            message,
        });
    }

    fn add_warning(&mut self, kind: DiagnosticKind, path: &str, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            path: path.to_string(),
            message,
        });
    }
}

/// A single validation diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// JSON path, e.g. `$.components[0].children[2]`
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} [{}] at {}: {}", prefix, self.kind, self.path, self.message)
    }
}

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Category of validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Wrong JSON type or missing required key
    Shape,
    /// Nesting beyond [`MAX_DEPTH`]
    Depth,
    /// `type` not in the component registry
    UnknownType,
    /// Controlled-vocabulary prop outside its valid set
    Vocabulary,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DiagnosticKind::Shape => write!(f, "shape"),
            DiagnosticKind::Depth => write!(f, "depth"),
            DiagnosticKind::UnknownType => write!(f, "unknown-type"),
            DiagnosticKind::Vocabulary => write!(f, "vocabulary"),
        }
    }
}

// ── Public API ────────────────────────────────────────────

/// Validate a generator response, reporting everything found.
///
/// `validate(v).is_valid() == is_valid_tree(v)` for every `v`.
pub fn validate(value: &Value) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(obj) = value.as_object() else {
        result.add_error(
            DiagnosticKind::Shape,
            "$",
            format!("expected an object, found {}", json_type_name(value)),
        );
        return result;
    };

    match obj.get("components") {
        None => result.add_error(
            DiagnosticKind::Shape,
            "$",
            "missing 'components' array".into(),
        ),
        Some(Value::Array(components)) => {
            for (i, component) in components.iter().enumerate() {
                validate_node(component, &format!("$.components[{}]", i), 1, &mut result);
            }
        }
        Some(other) => result.add_error(
            DiagnosticKind::Shape,
            "$.components",
            format!("expected an array, found {}", json_type_name(other)),
        ),
    }

    if let Some(state) = obj.get("userState") {
        if !state.is_object() {
            result.add_warning(
                DiagnosticKind::Shape,
                "$.userState",
                format!("expected an object, found {}; it will be ignored", json_type_name(state)),
            );
        }
    }

    result
}

fn validate_node(value: &Value, path: &str, depth: usize, result: &mut ValidationResult) {
    if depth > MAX_DEPTH {
        result.add_error(
            DiagnosticKind::Depth,
            path,
            format!("nesting exceeds {} levels", MAX_DEPTH),
        );
        return;
    }

    let Some(obj) = value.as_object() else {
        result.add_error(
            DiagnosticKind::Shape,
            path,
            format!("expected a component object, found {}", json_type_name(value)),
        );
        return;
    };

    // type
    match obj.get("type") {
        Some(Value::String(t)) if !t.is_empty() => {
            if ComponentKind::lookup(t).is_none() {
                result.add_warning(
                    DiagnosticKind::UnknownType,
                    path,
                    format!("component type '{}' is not registered and will be skipped", t),
                );
            }
        }
        Some(Value::String(_)) => {
            result.add_error(DiagnosticKind::Shape, path, "'type' is empty".into())
        }
        Some(other) => result.add_error(
            DiagnosticKind::Shape,
            path,
            format!("'type' must be a string, found {}", json_type_name(other)),
        ),
        None => result.add_error(DiagnosticKind::Shape, path, "missing 'type'".into()),
    }

    // props
    match obj.get("props") {
        Some(Value::Object(props)) => {
            for (key, prop) in props {
                if let Some(canonical) = vocabulary::normalize_value(key, prop) {
                    result.add_warning(
                        DiagnosticKind::Vocabulary,
                        &format!("{}.props.{}", path, key),
                        format!("{} will be normalized to {}", prop, canonical),
                    );
                }
            }
        }
        Some(other) => result.add_error(
            DiagnosticKind::Shape,
            path,
            format!("'props' must be an object, found {}", json_type_name(other)),
        ),
        None => result.add_error(DiagnosticKind::Shape, path, "missing 'props'".into()),
    }

    // children
    match obj.get("children") {
        None => {}
        Some(Value::Array(children)) => {
            for (i, child) in children.iter().enumerate() {
                if !child.is_string() {
                    validate_node(child, &format!("{}.children[{}]", path, i), depth + 1, result);
                }
            }
        }
        Some(other) => result.add_error(
            DiagnosticKind::Shape,
            &format!("{}.children", path),
            format!("'children' must be an array, found {}", json_type_name(other)),
        ),
    }
}

/// JSON type name for messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
