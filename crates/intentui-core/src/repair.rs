//! Structure repairer - coerces generator output into a valid response
//!
//! `repair` is total: for any JSON value it returns a [`GeneratorResponse`]
//! that satisfies [`crate::validator::is_valid_tree`] once serialized.
//!
//! # Strategy (first match wins)
//!
//! 1. Strings are cleaned up and parsed, then repaired as values
//! 2. Arrays holding type-bearing objects become the component list
//! 3. Objects: `components`, else `data`, else the object itself as a
//!    single node, else the first property holding type-bearing objects
//! 4. Every node is repaired recursively (defaults, promotions, drops)
//! 5. Controlled-vocabulary props are normalized on every node
//! 6. An object-typed `userState` is carried through verbatim
//!
//! Anything unrecoverable becomes the error card from [`error_response`].
//!
//! # Guarantees
//!
//! - **Total**: never panics, always returns a valid response
//! - **Idempotent**: `repair(repair(x)) == repair(x)`
//! - **Content preserving**: only vocabulary props are ever rewritten

use serde_json::{json, Value};
use tracing::debug;

use crate::parser::ast::{
    Child, ComponentNode, GeneratorResponse, Props, CONTAINER_PRIMITIVE, TEXT_PRIMITIVE,
    TITLE_PRIMITIVE,
};
use crate::parser::parse_lenient_with_fixes;
use crate::validator::{json_type_name, MAX_DEPTH};
use crate::vocabulary;

/// Nested JSON-in-a-string decodes accepted before giving up
const MAX_TEXT_DECODES: usize = 2;

/// Marker prop carried by the error card
pub const ERROR_VARIANT: &str = "error";

// ── Repair notes ──────────────────────────────────────────

/// One repair action, with the JSON path it applied to
#[derive(Debug, Clone, PartialEq)]
pub struct RepairNote {
    pub path: String,
    pub action: RepairAction,
}

impl std::fmt::Display for RepairNote {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.action)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepairAction {
    /// Text parsed as JSON, with the number of cleanup rewrites
    ParsedText { fixes: usize },
    /// Top-level array used as the component list
    PromotedArray,
    /// Component list found under another key
    ComponentsFrom { key: String },
    /// Object treated as a single component
    PromotedSingleNode,
    /// Missing or unusable `type` replaced by the container type
    DefaultedType,
    /// Missing or unusable `props` replaced by `{}`
    DefaultedProps,
    /// Primitive wrapped into a text node
    WrappedText,
    /// Non-array `children` promoted into an array
    PromotedChildren { from: &'static str },
    /// Value with no possible node interpretation removed
    Dropped { found: &'static str },
    /// Node removed because it exceeds the depth cap
    DroppedTooDeep,
    /// Vocabulary prop rewritten
    Normalized { key: String, from: Value, to: Value },
    /// Non-object `userState` discarded
    DroppedUserState,
    /// Nothing recoverable; error card returned
    Unrecoverable { reason: String },
}

impl std::fmt::Display for RepairAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RepairAction::ParsedText { fixes } => {
                write!(f, "parsed JSON text ({} cleanup fixes)", fixes)
            }
            RepairAction::PromotedArray => write!(f, "used top-level array as components"),
            RepairAction::ComponentsFrom { key } => write!(f, "used '{}' as components", key),
            RepairAction::PromotedSingleNode => write!(f, "wrapped single component in a list"),
            RepairAction::DefaultedType => write!(f, "defaulted type to {}", CONTAINER_PRIMITIVE),
            RepairAction::DefaultedProps => write!(f, "defaulted props to {{}}"),
            RepairAction::WrappedText => write!(f, "wrapped primitive in {}", TEXT_PRIMITIVE),
            RepairAction::PromotedChildren { from } => {
                write!(f, "promoted {} children into an array", from)
            }
            RepairAction::Dropped { found } => write!(f, "dropped {}", found),
            RepairAction::DroppedTooDeep => {
                write!(f, "dropped node nested beyond {} levels", MAX_DEPTH)
            }
            RepairAction::Normalized { key, from, to } => {
                write!(f, "normalized {} from {} to {}", key, from, to)
            }
            RepairAction::DroppedUserState => write!(f, "dropped non-object userState"),
            RepairAction::Unrecoverable { reason } => write!(f, "unrecoverable: {}", reason),
        }
    }
}

// ── Public API ────────────────────────────────────────────

/// Repair any JSON value into a valid response
pub fn repair(value: &Value) -> GeneratorResponse {
    repair_with_notes(value).0
}

/// Repair, also returning every action taken
pub fn repair_with_notes(value: &Value) -> (GeneratorResponse, Vec<RepairNote>) {
    let mut repairer = Repairer::default();
    let response = repairer.response(value, "$", 0);
    if !repairer.notes.is_empty() {
        debug!(notes = repairer.notes.len(), "repaired generator output");
    }
    (response, repairer.notes)
}

/// The single user-visible card returned for every unrecoverable failure
pub fn error_response(message: &str) -> GeneratorResponse {
    let card = json!({
        "type": CONTAINER_PRIMITIVE,
        "props": {
            "color": "pink",
            "variant": ERROR_VARIANT,
            "className": "w-full max-w-md mx-auto rounded-xl shadow-lg p-6",
        },
        "children": [
            {
                "type": TITLE_PRIMITIVE,
                "props": {"text": "Something went wrong", "level": 1, "color": "pink"}
            },
            {
                "type": TEXT_PRIMITIVE,
                "props": {
                    "color": "pink",
                    "size": "base",
                    "children": format!("Sorry, I could not process the response: {}", message),
                }
            }
        ]
    });
    match serde_json::from_value::<ComponentNode>(card) {
        Ok(node) => GeneratorResponse::new(vec![node]),
        Err(_) => GeneratorResponse::new(vec![ComponentNode::text(message)]),
    }
}

/// Whether a response is the error card
pub fn is_error_response(response: &GeneratorResponse) -> bool {
    matches!(
        response.components.as_slice(),
        [card] if card.props.get("variant").and_then(Value::as_str) == Some(ERROR_VARIANT)
    )
}

// ── Repairer ──────────────────────────────────────────────

#[derive(Default)]
struct Repairer {
    notes: Vec<RepairNote>,
}

impl Repairer {
    fn note(&mut self, path: &str, action: RepairAction) {
        self.notes.push(RepairNote {
            path: path.to_string(),
            action,
        });
    }

    fn unrecoverable(&mut self, path: &str, reason: &str) -> GeneratorResponse {
        self.note(
            path,
            RepairAction::Unrecoverable {
                reason: reason.to_string(),
            },
        );
        error_response(reason)
    }

    fn response(&mut self, value: &Value, path: &str, decodes: usize) -> GeneratorResponse {
        match value {
            Value::String(text) => {
                if decodes >= MAX_TEXT_DECODES {
                    return self.unrecoverable(path, "JSON nested in too many string layers");
                }
                match parse_lenient_with_fixes(text) {
                    Ok((parsed, fixes)) => {
                        self.note(path, RepairAction::ParsedText { fixes: fixes.len() });
                        self.response(&parsed, path, decodes + 1)
                    }
                    Err(_) => self.unrecoverable(path, "invalid JSON format"),
                }
            }
            Value::Array(items) => {
                if items.iter().any(looks_like_node) {
                    self.note(path, RepairAction::PromotedArray);
                    GeneratorResponse::new(self.components(items, path))
                } else {
                    self.unrecoverable(path, "received an array without any component")
                }
            }
            Value::Object(obj) => {
                let Some(components) = self.locate_components(obj, path) else {
                    return self.unrecoverable(path, "missing or invalid 'components' property");
                };
                let mut response = GeneratorResponse::new(components);
                match obj.get("userState") {
                    Some(Value::Object(state)) => response.user_state = Some(state.clone()),
                    Some(Value::Null) | None => {}
                    Some(_) => self.note(&format!("{}.userState", path), RepairAction::DroppedUserState),
                }
                response
            }
            other => self.unrecoverable(
                path,
                &format!("expected an object with 'components', found {}", json_type_name(other)),
            ),
        }
    }

    fn locate_components(&mut self, obj: &Props, path: &str) -> Option<Vec<ComponentNode>> {
        match obj.get("components") {
            Some(Value::Array(items)) => {
                return Some(self.components(items, &format!("{}.components", path)));
            }
            Some(single) if looks_like_node(single) => {
                let inner = format!("{}.components", path);
                self.note(&inner, RepairAction::PromotedSingleNode);
                return Some(self.components(std::slice::from_ref(single), &inner));
            }
            _ => {}
        }

        if let Some(Value::Array(items)) = obj.get("data") {
            self.note(path, RepairAction::ComponentsFrom { key: "data".into() });
            return Some(self.components(items, &format!("{}.data", path)));
        }

        let has_type = obj
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.is_empty());
        if has_type && obj.get("props").is_some_and(|p| !p.is_null()) {
            self.note(path, RepairAction::PromotedSingleNode);
            let node = self.node(&Value::Object(obj.clone()), &format!("{}[0]", path), 1);
            return Some(node.into_iter().collect());
        }

        let (key, items) = obj.iter().find_map(|(key, value)| match value {
            Value::Array(items) if items.iter().any(looks_like_node) => Some((key, items)),
            _ => None,
        })?;
        self.note(path, RepairAction::ComponentsFrom { key: key.clone() });
        Some(self.components(items, &format!("{}.{}", path, key)))
    }

    fn components(&mut self, items: &[Value], path: &str) -> Vec<ComponentNode> {
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| self.node(item, &format!("{}[{}]", path, i), 1))
            .collect()
    }

    /// Repair one node at `depth` (top-level nodes are depth 1)
    fn node(&mut self, value: &Value, path: &str, depth: usize) -> Option<ComponentNode> {
        if depth > MAX_DEPTH {
            self.note(path, RepairAction::DroppedTooDeep);
            return None;
        }

        let obj = match value {
            Value::Object(obj) => obj,
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                self.note(path, RepairAction::WrappedText);
                return Some(ComponentNode::text(primitive_text(value)));
            }
            Value::Null | Value::Array(_) => {
                self.note(
                    path,
                    RepairAction::Dropped {
                        found: json_type_name(value),
                    },
                );
                return None;
            }
        };

        let kind = match obj.get("type") {
            Some(Value::String(t)) if !t.is_empty() => t.clone(),
            _ => {
                self.note(path, RepairAction::DefaultedType);
                CONTAINER_PRIMITIVE.to_string()
            }
        };

        let mut props = match obj.get("props") {
            Some(Value::Object(props)) => props.clone(),
            _ => {
                self.note(path, RepairAction::DefaultedProps);
                Props::new()
            }
        };
        for change in vocabulary::normalize_props(&mut props) {
            self.note(
                &format!("{}.props", path),
                RepairAction::Normalized {
                    key: change.key,
                    from: change.from,
                    to: change.to,
                },
            );
        }

        let children = self.children(obj.get("children"), path, depth);

        Some(ComponentNode {
            kind,
            props,
            children,
        })
    }

    fn children(&mut self, value: Option<&Value>, path: &str, depth: usize) -> Option<Vec<Child>> {
        let children_path = format!("{}.children", path);
        match value? {
            Value::Null => None,
            Value::Array(items) => Some(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        let item_path = format!("{}[{}]", children_path, i);
                        match item {
                            Value::String(text) => Some(Child::Text(text.clone())),
                            other => self.node(other, &item_path, depth + 1).map(Child::Node),
                        }
                    })
                    .collect(),
            ),
            single @ Value::Object(_) => {
                self.note(&children_path, RepairAction::PromotedChildren { from: "object" });
                let node = self.node(single, &format!("{}[0]", children_path), depth + 1);
                Some(node.map(Child::Node).into_iter().collect())
            }
            primitive @ (Value::String(_) | Value::Number(_)) => {
                self.note(
                    &children_path,
                    RepairAction::PromotedChildren {
                        from: json_type_name(primitive),
                    },
                );
                Some(vec![Child::Node(ComponentNode::text(primitive_text(primitive)))])
            }
            Value::Bool(_) => {
                self.note(&children_path, RepairAction::Dropped { found: "boolean" });
                None
            }
        }
    }
}

/// Whether a value is an object with a `type` field
fn looks_like_node(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("type"))
        .is_some_and(|t| !t.is_null())
}

fn primitive_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
