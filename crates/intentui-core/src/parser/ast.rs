//! Component schema - the recursive `{type, props, children?}` tree
//!
//! These types are the validated form of generator output. Values only
//! reach them through the validator or the repairer, so every node here
//! satisfies the schema invariants:
//!
//! - `kind` is non-empty
//! - `props` is an object (possibly empty)
//! - `children` is absent or a sequence of nodes and strings
//!
//! Props keep `serde_json::Map` ordering (sorted keys) so serialization is
//! deterministic and fingerprints are stable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Free-form props bag of a node
pub type Props = serde_json::Map<String, Value>;

/// Ordered sequence of top-level nodes
pub type ComponentTree = Vec<ComponentNode>;

/// Type used for text synthesized from bare strings and numbers
pub const TEXT_PRIMITIVE: &str = "FloatingText";

/// Type used when a node carries no usable `type`
pub const CONTAINER_PRIMITIVE: &str = "FloatingCard";

/// Type used for headings
pub const TITLE_PRIMITIVE: &str = "FloatingTitle";

/// One renderable UI element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: Props,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Child>>,
}

/// Element of a `children` sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    Text(String),
    Node(ComponentNode),
}

/// Generator output after validation: the tree plus the opaque user-state
/// side channel
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratorResponse {
    pub components: ComponentTree,
    #[serde(rename = "userState", default, skip_serializing_if = "Option::is_none")]
    pub user_state: Option<Props>,
}

impl ComponentNode {
    pub fn new(kind: impl Into<String>, props: Props) -> Self {
        ComponentNode {
            kind: kind.into(),
            props,
            children: None,
        }
    }

    pub fn with_children(mut self, children: Vec<Child>) -> Self {
        self.children = Some(children);
        self
    }

    /// Synthetic text node wrapping a bare string
    pub fn text(content: impl Into<String>) -> Self {
        let mut props = Props::new();
        props.insert("color".into(), Value::String("indigo".into()));
        props.insert("size".into(), Value::String("base".into()));
        props.insert("children".into(), Value::String(content.into()));
        ComponentNode::new(TEXT_PRIMITIVE, props)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.as_ref().map_or(true, |c| c.is_empty())
    }

    /// Child nodes, skipping literal text
    pub fn child_nodes(&self) -> impl Iterator<Item = &ComponentNode> {
        self.children
            .iter()
            .flatten()
            .filter_map(|child| match child {
                Child::Node(node) => Some(node),
                Child::Text(_) => None,
            })
    }

    /// Depth of the subtree rooted here (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        1 + self.child_nodes().map(|n| n.depth()).max().unwrap_or(0)
    }

    /// Number of nodes in the subtree, this one included
    pub fn node_count(&self) -> usize {
        1 + self.child_nodes().map(|n| n.node_count()).sum::<usize>()
    }
}

impl From<ComponentNode> for Child {
    fn from(node: ComponentNode) -> Self {
        Child::Node(node)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl GeneratorResponse {
    pub fn new(components: ComponentTree) -> Self {
        GeneratorResponse {
            components,
            user_state: None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Compact JSON, as appended to conversation history
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// SHA-256 over the canonical JSON of the tree (user state excluded)
    pub fn fingerprint(&self) -> String {
        let canonical = Value::Array(
            self.components
                .iter()
                .map(|n| serde_json::to_value(n).unwrap_or(Value::Null))
                .collect(),
        )
        .to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn node_count(&self) -> usize {
        self.components.iter().map(|n| n.node_count()).sum()
    }
}
