//! Closed component registry
//!
//! The only `type` strings the renderer will instantiate. Lookup of any
//! other string returns `None`; there is no dynamic instantiation by name.

use serde::{Deserialize, Serialize};

/// How a primitive consumes its rendered `children`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildrenMode {
    /// Rendered children are injected as content
    Inject,
    /// Content comes from the named prop; rendered children are ignored
    FromProp(&'static str),
}

/// Every renderable primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    FloatingCard,
    FloatingTitle,
    FloatingText,
    FloatingList,
    FloatingInput,
    FloatingButton,
    FloatingChart,
    FloatingMathCard,
    FloatingFraction,
    FloatingEquation,
    FloatingMathGame,
    FloatingPolynomial,
    FloatingGeometry,
    FloatingCoordinateSystem,
    FloatingEquationSolver,
    FloatingImage,
    FloatingGallery,
    FloatingImageCard,
    FloatingAvatar,
    FloatingImageSearch,
    FloatingCustomCard,
    FloatingCustomText,
    FloatingCustomContainer,
    CustomMathGame,
    #[serde(rename = "div")]
    Div,
    #[serde(rename = "span")]
    Span,
    #[serde(rename = "p")]
    Paragraph,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 27] = [
        ComponentKind::FloatingCard,
        ComponentKind::FloatingTitle,
        ComponentKind::FloatingText,
        ComponentKind::FloatingList,
        ComponentKind::FloatingInput,
        ComponentKind::FloatingButton,
        ComponentKind::FloatingChart,
        ComponentKind::FloatingMathCard,
        ComponentKind::FloatingFraction,
        ComponentKind::FloatingEquation,
        ComponentKind::FloatingMathGame,
        ComponentKind::FloatingPolynomial,
        ComponentKind::FloatingGeometry,
        ComponentKind::FloatingCoordinateSystem,
        ComponentKind::FloatingEquationSolver,
        ComponentKind::FloatingImage,
        ComponentKind::FloatingGallery,
        ComponentKind::FloatingImageCard,
        ComponentKind::FloatingAvatar,
        ComponentKind::FloatingImageSearch,
        ComponentKind::FloatingCustomCard,
        ComponentKind::FloatingCustomText,
        ComponentKind::FloatingCustomContainer,
        ComponentKind::CustomMathGame,
        ComponentKind::Div,
        ComponentKind::Span,
        ComponentKind::Paragraph,
    ];

    /// Exact, case-sensitive lookup of a `type` string
    pub fn lookup(type_name: &str) -> Option<ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == type_name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::FloatingCard => "FloatingCard",
            ComponentKind::FloatingTitle => "FloatingTitle",
            ComponentKind::FloatingText => "FloatingText",
            ComponentKind::FloatingList => "FloatingList",
            ComponentKind::FloatingInput => "FloatingInput",
            ComponentKind::FloatingButton => "FloatingButton",
            ComponentKind::FloatingChart => "FloatingChart",
            ComponentKind::FloatingMathCard => "FloatingMathCard",
            ComponentKind::FloatingFraction => "FloatingFraction",
            ComponentKind::FloatingEquation => "FloatingEquation",
            ComponentKind::FloatingMathGame => "FloatingMathGame",
            ComponentKind::FloatingPolynomial => "FloatingPolynomial",
            ComponentKind::FloatingGeometry => "FloatingGeometry",
            ComponentKind::FloatingCoordinateSystem => "FloatingCoordinateSystem",
            ComponentKind::FloatingEquationSolver => "FloatingEquationSolver",
            ComponentKind::FloatingImage => "FloatingImage",
            ComponentKind::FloatingGallery => "FloatingGallery",
            ComponentKind::FloatingImageCard => "FloatingImageCard",
            ComponentKind::FloatingAvatar => "FloatingAvatar",
            ComponentKind::FloatingImageSearch => "FloatingImageSearch",
            ComponentKind::FloatingCustomCard => "FloatingCustomCard",
            ComponentKind::FloatingCustomText => "FloatingCustomText",
            ComponentKind::FloatingCustomContainer => "FloatingCustomContainer",
            ComponentKind::CustomMathGame => "CustomMathGame",
            ComponentKind::Div => "div",
            ComponentKind::Span => "span",
            ComponentKind::Paragraph => "p",
        }
    }

    pub fn children_mode(&self) -> ChildrenMode {
        match self {
            ComponentKind::FloatingTitle => ChildrenMode::FromProp("text"),
            ComponentKind::FloatingList => ChildrenMode::FromProp("items"),
            _ => ChildrenMode::Inject,
        }
    }

    /// Generic HTML tags passed through as-is
    pub fn is_passthrough(&self) -> bool {
        matches!(
            self,
            ComponentKind::Div | ComponentKind::Span | ComponentKind::Paragraph
        )
    }

    /// Primitives that lay out other primitives
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ComponentKind::FloatingCard
                | ComponentKind::FloatingMathCard
                | ComponentKind::FloatingCustomCard
                | ComponentKind::FloatingCustomContainer
                | ComponentKind::Div
        )
    }

    /// Primitives whose content is an image fetched by search query
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            ComponentKind::FloatingImage
                | ComponentKind::FloatingGallery
                | ComponentKind::FloatingImageCard
                | ComponentKind::FloatingAvatar
                | ComponentKind::FloatingImageSearch
        )
    }

    /// One-line prop summary handed to language models
    pub fn description(&self) -> &'static str {
        match self {
            ComponentKind::FloatingCard => "floating container; props: color, className",
            ComponentKind::FloatingTitle => "heading; props: text, level (1-6), color",
            ComponentKind::FloatingText => "paragraph; props: children (text), color, size",
            ComponentKind::FloatingList => "bullet list; props: items (string[]), color",
            ComponentKind::FloatingInput => "text input; props: placeholder, color",
            ComponentKind::FloatingButton => "button; props: children (label), color",
            ComponentKind::FloatingChart => {
                "chart; props: chartType ('line' | 'bar'), data ({name, value}[]), color"
            }
            ComponentKind::FloatingMathCard => {
                "themed math container; props: theme ('space' | 'ocean' | 'jungle' | 'circus'), color"
            }
            ComponentKind::FloatingFraction => {
                "fraction visual; props: numerator, denominator, showVisual, color"
            }
            ComponentKind::FloatingEquation => "animated equation; props: equation, animated, color",
            ComponentKind::FloatingMathGame => {
                "quiz game; props: operation, difficulty, questions, showExplanations, showTimer"
            }
            ComponentKind::FloatingPolynomial => "polynomial; props: coefficients (number[]), variable, color",
            ComponentKind::FloatingGeometry => {
                "shape with perimeter/area; props: shape ('triangle' | 'square' | 'rectangle' | 'circle'), size, color"
            }
            ComponentKind::FloatingCoordinateSystem => "plane with points; props: points ({x, y, label}[]), color",
            ComponentKind::FloatingEquationSolver => "step-by-step solution; props: equation, steps (string[]), color",
            ComponentKind::FloatingImage => {
                "image; props: src ('unsplash' or URL), searchQuery, alt, width, height, animation"
            }
            ComponentKind::FloatingGallery => "image grid; props: queries (string[]), columns",
            ComponentKind::FloatingImageCard => {
                "image with text; props: searchQuery, title, description, imagePosition"
            }
            ComponentKind::FloatingAvatar => "round portrait; props: searchQuery, name, size",
            ComponentKind::FloatingImageSearch => "generated image; props: prompt, alt",
            ComponentKind::FloatingCustomCard => "themed card; props: theme, animation",
            ComponentKind::FloatingCustomText => "themed text; props: theme, animation",
            ComponentKind::FloatingCustomContainer => "themed layout box; props: theme, layout",
            ComponentKind::CustomMathGame => {
                "custom quiz; props: title, problems ({question, answer, options, explanation}[]), showExplanations, showTimer"
            }
            ComponentKind::Div => "generic block; any HTML attributes",
            ComponentKind::Span => "generic inline; any HTML attributes",
            ComponentKind::Paragraph => "generic paragraph; any HTML attributes",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural-language schema description built from the registry, used by
/// both the intent prompt and the escalation prompt.
pub fn schema_description() -> String {
    let mut out = String::from(
        "The expected structure is an object with a 'components' property holding an array of objects.\n\
         Each component has a 'type' (string) and a 'props' (object).\n\
         A component may have a 'children' property: an array of components or plain strings.\n\
         An optional 'userState' object may carry learner profile updates.\n\
         Allowed component types:\n",
    );
    for kind in ComponentKind::ALL {
        out.push_str("- ");
        out.push_str(kind.as_str());
        out.push_str(": ");
        out.push_str(kind.description());
        out.push('\n');
    }
    out.push_str(
        "Allowed colors: blue, red, green, yellow, purple, pink, indigo, teal, orange, gray.\n\
         Allowed sizes: xs, sm, base, lg, xl, 2xl, 3xl, 4xl.\n",
    );
    out
}
