//! Presentation metadata - grid position and animation phase
//!
//! Pure functions of tree position and viewport size. Nothing here is
//! stored in the component tree; it is recomputed on every render.

use serde::{Deserialize, Serialize};

use crate::renderer::registry::ComponentKind;

/// Minimum column width on the grid
pub const COLUMN_WIDTH: u32 = 360;
pub const MAX_COLUMNS: u32 = 4;
pub const ROW_HEIGHT: u32 = 320;

pub const STAGGER_MS: u64 = 100;
pub const DEPTH_STAGGER_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Viewport { width, height }
    }

    pub fn columns(&self) -> u32 {
        (self.width / COLUMN_WIDTH).clamp(1, MAX_COLUMNS)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1280,
            height: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Animation {
    Float,
    Pulse,
    Sparkle,
}

impl Animation {
    pub fn for_kind(kind: ComponentKind) -> Animation {
        match kind {
            k if k.is_container() => Animation::Float,
            ComponentKind::FloatingFraction | ComponentKind::FloatingEquation => Animation::Pulse,
            _ => Animation::Sparkle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Animation::Float => "float",
            Animation::Pulse => "pulse",
            Animation::Sparkle => "sparkle",
        }
    }
}

/// Position on the grid; only top-level nodes are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutMeta {
    pub position: Option<Position>,
    pub animation: Animation,
    pub delay_ms: u64,
}

/// Grid cell of the `index`-th top-level node
pub fn position(index: usize, viewport: Viewport) -> Position {
    let columns = viewport.columns();
    let index = u32::try_from(index).unwrap_or(u32::MAX);
    let (row, col) = (index / columns, index % columns);
    Position {
        x: col * (viewport.width / columns),
        y: row.saturating_mul(ROW_HEIGHT),
    }
}

/// Metadata of a node at `index` among its siblings, `depth` levels down
/// (top-level nodes are depth 0)
pub fn layout(kind: ComponentKind, index: usize, depth: usize, viewport: Viewport) -> LayoutMeta {
    LayoutMeta {
        position: (depth == 0).then(|| position(index, viewport)),
        animation: Animation::for_kind(kind),
        delay_ms: index as u64 * STAGGER_MS + depth as u64 * DEPTH_STAGGER_MS,
    }
}
