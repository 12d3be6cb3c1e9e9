//! Typed props per renderable primitive
//!
//! Each registry kind with a dedicated visual gets a record with typed
//! fields and its own defaults. Kinds without one keep their props bag as
//! a `Widget`; passthrough tags become an `Element` with attributes.

use serde::Serialize;
use serde_json::Value;

use crate::parser::ast::Props;
use crate::renderer::registry::ComponentKind;
use crate::vocabulary::{parse_level, Color, Size};

/// Where an image comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum ImageSource {
    /// Resolved later by an image search collaborator
    Search(String),
    /// Direct http(s) URL
    Url(String),
    /// Nothing usable was given
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "primitive", rename_all = "snake_case")]
pub enum Primitive {
    Card {
        color: Color,
        class_name: Option<String>,
    },
    Title {
        text: String,
        level: u8,
        color: Color,
    },
    Text {
        content: Option<String>,
        color: Color,
        size: Size,
    },
    List {
        items: Vec<String>,
        color: Color,
    },
    Button {
        label: Option<String>,
        color: Color,
    },
    Input {
        placeholder: String,
        color: Color,
    },
    Image {
        image: ImageSource,
        alt: String,
        width: Option<u32>,
        height: Option<u32>,
    },
    Fraction {
        numerator: i64,
        denominator: i64,
        show_visual: bool,
        color: Color,
    },
    Equation {
        equation: String,
        animated: bool,
        color: Color,
    },
    Widget {
        kind: ComponentKind,
        props: Props,
    },
    Element {
        tag: &'static str,
        attrs: Props,
    },
}

impl Primitive {
    /// Build the typed record for a kind from its props
    pub fn from_props(kind: ComponentKind, props: &Props) -> Primitive {
        match kind {
            ComponentKind::FloatingCard => Primitive::Card {
                color: color_or(props, Color::Blue),
                class_name: string_prop(props, "className"),
            },
            ComponentKind::FloatingTitle => Primitive::Title {
                text: string_prop(props, "text").unwrap_or_default(),
                level: props.get("level").and_then(parse_level).unwrap_or(1),
                color: color_or(props, Color::Purple),
            },
            ComponentKind::FloatingText => Primitive::Text {
                content: string_prop(props, "children"),
                color: color_or(props, Color::Green),
                size: props
                    .get("size")
                    .and_then(Value::as_str)
                    .and_then(Size::parse)
                    .unwrap_or(Size::Base),
            },
            ComponentKind::FloatingList => Primitive::List {
                items: string_list(props.get("items")),
                color: color_or(props, Color::Pink),
            },
            ComponentKind::FloatingButton => Primitive::Button {
                label: string_prop(props, "children").or_else(|| string_prop(props, "text")),
                color: color_or(props, Color::Purple),
            },
            ComponentKind::FloatingInput => Primitive::Input {
                placeholder: string_prop(props, "placeholder").unwrap_or_default(),
                color: color_or(props, Color::Pink),
            },
            ComponentKind::FloatingImage => Primitive::Image {
                image: image_source(props),
                alt: string_prop(props, "alt").unwrap_or_default(),
                width: dimension(props, "width"),
                height: dimension(props, "height"),
            },
            ComponentKind::FloatingFraction => Primitive::Fraction {
                numerator: integer_prop(props, "numerator").unwrap_or(0),
                denominator: integer_prop(props, "denominator").unwrap_or(1),
                show_visual: bool_prop(props, "showVisual").unwrap_or(true),
                color: color_or(props, Color::Purple),
            },
            ComponentKind::FloatingEquation => Primitive::Equation {
                equation: string_prop(props, "equation").unwrap_or_default(),
                animated: bool_prop(props, "animated").unwrap_or(true),
                color: color_or(props, Color::Blue),
            },
            kind if kind.is_passthrough() => Primitive::Element {
                tag: kind.as_str(),
                attrs: props.clone(),
            },
            kind => Primitive::Widget {
                kind,
                props: props.clone(),
            },
        }
    }

    /// Search query this primitive needs resolved, if any
    pub fn image_queries(&self) -> Vec<String> {
        match self {
            Primitive::Image {
                image: ImageSource::Search(query),
                ..
            } => vec![query.clone()],
            Primitive::Widget { kind, props } => match kind {
                ComponentKind::FloatingImageCard | ComponentKind::FloatingAvatar => {
                    string_prop(props, "searchQuery").into_iter().collect()
                }
                ComponentKind::FloatingGallery => string_list(props.get("queries")),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

// ── Prop readers ──────────────────────────────────────────

fn color_or(props: &Props, default: Color) -> Color {
    props
        .get("color")
        .and_then(Value::as_str)
        .and_then(Color::parse)
        .unwrap_or(default)
}

fn string_prop(props: &Props, key: &str) -> Option<String> {
    match props.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn integer_prop(props: &Props, key: &str) -> Option<i64> {
    match props.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_prop(props: &Props, key: &str) -> Option<bool> {
    props.get(key)?.as_bool()
}

fn dimension(props: &Props, key: &str) -> Option<u32> {
    integer_prop(props, key).and_then(|n| u32::try_from(n).ok())
}

/// Whether a URL is safe to emit as a link or image source
pub fn is_safe_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

fn image_source(props: &Props) -> ImageSource {
    let src = props
        .get("src")
        .and_then(Value::as_str)
        .unwrap_or("unsplash");
    if src == "unsplash" {
        match string_prop(props, "searchQuery") {
            Some(query) if !query.trim().is_empty() => ImageSource::Search(query),
            _ => ImageSource::Missing,
        }
    } else if is_safe_url(src) {
        ImageSource::Url(src.to_string())
    } else {
        ImageSource::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_per_kind() {
        let empty = Props::new();
        assert_eq!(
            Primitive::from_props(ComponentKind::FloatingCard, &empty),
            Primitive::Card {
                color: Color::Blue,
                class_name: None
            }
        );
        assert_eq!(
            Primitive::from_props(ComponentKind::FloatingTitle, &empty),
            Primitive::Title {
                text: String::new(),
                level: 1,
                color: Color::Purple
            }
        );
        assert_eq!(
            Primitive::from_props(ComponentKind::FloatingText, &empty),
            Primitive::Text {
                content: None,
                color: Color::Green,
                size: Size::Base
            }
        );
        assert!(matches!(
            Primitive::from_props(ComponentKind::FloatingList, &empty),
            Primitive::List { color: Color::Pink, .. }
        ));
        assert!(matches!(
            Primitive::from_props(ComponentKind::FloatingFraction, &empty),
            Primitive::Fraction {
                show_visual: true,
                color: Color::Purple,
                ..
            }
        ));
    }

    #[test]
    fn test_typed_fields_read_from_props() {
        let p = props(json!({"numerator": 3, "denominator": "4", "showVisual": false, "color": "teal"}));
        assert_eq!(
            Primitive::from_props(ComponentKind::FloatingFraction, &p),
            Primitive::Fraction {
                numerator: 3,
                denominator: 4,
                show_visual: false,
                color: Color::Teal
            }
        );
    }

    #[test]
    fn test_list_items_skip_non_text() {
        let p = props(json!({"items": ["un", 2, {"x": 1}, null]}));
        let Primitive::List { items, .. } = Primitive::from_props(ComponentKind::FloatingList, &p) else {
            panic!("expected list");
        };
        assert_eq!(items, vec!["un", "2"]);
    }

    #[test]
    fn test_passthrough_is_element() {
        let p = props(json!({"className": "row"}));
        assert_eq!(
            Primitive::from_props(ComponentKind::Paragraph, &p),
            Primitive::Element {
                tag: "p",
                attrs: p.clone()
            }
        );
    }

    #[test]
    fn test_other_kinds_are_widgets() {
        let p = props(json!({"operation": "addition", "questions": 5}));
        assert!(matches!(
            Primitive::from_props(ComponentKind::FloatingMathGame, &p),
            Primitive::Widget { kind: ComponentKind::FloatingMathGame, .. }
        ));
    }

    #[test]
    fn test_image_sources() {
        let search = props(json!({"searchQuery": "pizza"}));
        let url = props(json!({"src": "https://img.example.com/a.png"}));
        let script = props(json!({"src": "javascript:alert(1)"}));

        let image = |p: &Props| match Primitive::from_props(ComponentKind::FloatingImage, p) {
            Primitive::Image { image, .. } => image,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(image(&search), ImageSource::Search("pizza".into()));
        assert_eq!(image(&url), ImageSource::Url("https://img.example.com/a.png".into()));
        assert_eq!(image(&script), ImageSource::Missing);
    }

    #[test]
    fn test_image_queries() {
        let card = Primitive::from_props(
            ComponentKind::FloatingImageCard,
            &props(json!({"searchQuery": "volcano"})),
        );
        let gallery = Primitive::from_props(
            ComponentKind::FloatingGallery,
            &props(json!({"queries": ["cat", "dog"]})),
        );
        let generated = Primitive::from_props(
            ComponentKind::FloatingImageSearch,
            &props(json!({"prompt": "a robot"})),
        );
        assert_eq!(card.image_queries(), vec!["volcano"]);
        assert_eq!(gallery.image_queries(), vec!["cat", "dog"]);
        assert!(generated.image_queries().is_empty());
    }
}
