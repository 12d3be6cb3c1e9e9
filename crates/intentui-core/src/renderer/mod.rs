//! Dynamic renderer - validated tree to renderable primitives
//!
//! Maps every node through the closed registry. Unknown types are skipped
//! with a warning while their siblings render normally. Rendering is pure:
//! no I/O, no mutation of the input, and layout metadata depends only on
//! tree position and viewport.
//!
//! # Keys
//!
//! Each rendered node carries a stable key built from its index path
//! (`"0"`, `"0.2"`, `"0.2.1"`). Indices count skipped siblings too, so a
//! skipped node never shifts the keys of the nodes after it.

pub mod html;
pub mod layout;
pub mod primitive;
pub mod registry;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::parser::ast::{Child, ComponentNode};
use crate::validator::{is_valid_tree, MAX_DEPTH};
use crate::{Error, Result};
use layout::{LayoutMeta, Viewport};
use primitive::Primitive;
use registry::{ChildrenMode, ComponentKind};

// ── Rendered form ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNode {
    pub key: String,
    pub kind: ComponentKind,
    pub primitive: Primitive,
    pub children: Vec<RenderedChild>,
    pub layout: LayoutMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderedChild {
    Text(String),
    Node(RenderedNode),
}

/// A node left out of the output, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedNode {
    pub key: String,
    pub type_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RenderedOutput {
    /// One entry per rendered top-level node, in input order
    pub nodes: Vec<RenderedNode>,
    pub skipped: Vec<SkippedNode>,
}

impl RenderedOutput {
    /// Every image search query in the output, in document order
    pub fn image_queries(&self) -> Vec<String> {
        fn walk(node: &RenderedNode, out: &mut Vec<String>) {
            out.extend(node.primitive.image_queries());
            for child in &node.children {
                if let RenderedChild::Node(n) = child {
                    walk(n, out);
                }
            }
        }
        let mut out = Vec::new();
        for node in &self.nodes {
            walk(node, &mut out);
        }
        out
    }

    pub fn node_count(&self) -> usize {
        fn count(node: &RenderedNode) -> usize {
            1 + node
                .children
                .iter()
                .map(|c| match c {
                    RenderedChild::Node(n) => count(n),
                    RenderedChild::Text(_) => 0,
                })
                .sum::<usize>()
        }
        self.nodes.iter().map(count).sum()
    }
}

// ── Renderer ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    viewport: Viewport,
}

impl Renderer {
    pub fn new(viewport: Viewport) -> Self {
        Renderer { viewport }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Render a tree, one output per renderable top-level node
    pub fn render(&self, tree: &[ComponentNode]) -> RenderedOutput {
        let mut output = RenderedOutput::default();
        for (index, node) in tree.iter().enumerate() {
            if let Some(rendered) = self.render_node(node, index.to_string(), index, 0, &mut output.skipped) {
                output.nodes.push(rendered);
            }
        }
        output
    }

    /// Render a raw JSON value that must already be a valid tree
    ///
    /// # Errors
    /// `RenderError` when the value fails validation.
    pub fn render_value(&self, value: &Value) -> Result<RenderedOutput> {
        if !is_valid_tree(value) {
            return Err(Error::RenderError("value is not a valid component tree".into()));
        }
        // `userState` is not rendered and may have any shape
        let components = value.get("components").cloned().unwrap_or_default();
        let tree: Vec<ComponentNode> =
            serde_json::from_value(components).map_err(|e| Error::RenderError(e.to_string()))?;
        Ok(self.render(&tree))
    }

    fn render_node(
        &self,
        node: &ComponentNode,
        key: String,
        index: usize,
        depth: usize,
        skipped: &mut Vec<SkippedNode>,
    ) -> Option<RenderedNode> {
        let Some(kind) = ComponentKind::lookup(&node.kind) else {
            warn!(key = %key, component = %node.kind, "unknown component type skipped");
            skipped.push(SkippedNode {
                key,
                type_name: node.kind.clone(),
                reason: "unknown component type".into(),
            });
            return None;
        };
        if depth >= MAX_DEPTH {
            warn!(key = %key, "component nested too deep skipped");
            skipped.push(SkippedNode {
                key,
                type_name: node.kind.clone(),
                reason: format!("nested beyond {} levels", MAX_DEPTH),
            });
            return None;
        }

        let children = match kind.children_mode() {
            ChildrenMode::FromProp(_) => Vec::new(),
            ChildrenMode::Inject => node
                .children
                .iter()
                .flatten()
                .enumerate()
                .filter_map(|(i, child)| match child {
                    Child::Text(text) => Some(RenderedChild::Text(text.clone())),
                    Child::Node(child) => self
                        .render_node(child, format!("{}.{}", key, i), i, depth + 1, skipped)
                        .map(RenderedChild::Node),
                })
                .collect(),
        };

        Some(RenderedNode {
            primitive: Primitive::from_props(kind, &node.props),
            layout: layout::layout(kind, index, depth, self.viewport),
            key,
            kind,
            children,
        })
    }
}

/// Convenience wrapper with the default viewport
pub fn render(tree: &[ComponentNode]) -> RenderedOutput {
    Renderer::default().render(tree)
}

// ── Image search ──────────────────────────────────────────

/// Resolves an image search query to an image URL
#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<String>>;
}

/// Resolve every query in the output; failed or empty lookups are left out
pub async fn resolve_images(search: &dyn ImageSearch, output: &RenderedOutput) -> BTreeMap<String, String> {
    let mut resolved = BTreeMap::new();
    for query in output.image_queries() {
        if resolved.contains_key(&query) {
            continue;
        }
        match search.search(&query).await {
            Ok(Some(url)) if primitive::is_safe_url(&url) => {
                resolved.insert(query, url);
            }
            Ok(_) => {}
            Err(e) => warn!(query = %query, error = %e, "image search failed"),
        }
    }
    resolved
}
