//! Controlled-vocabulary props - colors, sizes, heading levels, booleans
//!
//! Only the keys listed here are ever rewritten by the repairer. Every other
//! prop value, and every nested object, passes through untouched.
//!
//! | key | valid set | fallback |
//! |---|---|---|
//! | `color` | blue red green yellow purple pink indigo teal orange gray | `blue` |
//! | `size` | xs sm base lg xl 2xl 3xl 4xl | `base` |
//! | `level` | integer 1–6 | `2` |
//! | `is*` `has*` `showExplanations` `showTimer` | boolean words | unchanged |
//!
//! Normalization is a fixed point: applying it to its own output is a no-op.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parser::ast::Props;

/// Palette color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Red,
    Green,
    Yellow,
    Purple,
    Pink,
    Indigo,
    Teal,
    Orange,
    Gray,
}

impl Color {
    pub const ALL: [Color; 10] = [
        Color::Blue,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Purple,
        Color::Pink,
        Color::Indigo,
        Color::Teal,
        Color::Orange,
        Color::Gray,
    ];

    pub const FALLBACK: Color = Color::Blue;

    /// Case-insensitive lookup
    pub fn parse(s: &str) -> Option<Color> {
        let lower = s.trim().to_ascii_lowercase();
        Color::ALL.into_iter().find(|c| c.as_str() == lower)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Purple => "purple",
            Color::Pink => "pink",
            Color::Indigo => "indigo",
            Color::Teal => "teal",
            Color::Orange => "orange",
            Color::Gray => "gray",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text size scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Size {
    #[serde(rename = "xs")]
    Xs,
    #[serde(rename = "sm")]
    Sm,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "lg")]
    Lg,
    #[serde(rename = "xl")]
    Xl,
    #[serde(rename = "2xl")]
    Xl2,
    #[serde(rename = "3xl")]
    Xl3,
    #[serde(rename = "4xl")]
    Xl4,
}

impl Size {
    pub const ALL: [Size; 8] = [
        Size::Xs,
        Size::Sm,
        Size::Base,
        Size::Lg,
        Size::Xl,
        Size::Xl2,
        Size::Xl3,
        Size::Xl4,
    ];

    pub const FALLBACK: Size = Size::Base;

    pub fn parse(s: &str) -> Option<Size> {
        let lower = s.trim().to_ascii_lowercase();
        Size::ALL.into_iter().find(|size| size.as_str() == lower)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Xs => "xs",
            Size::Sm => "sm",
            Size::Base => "base",
            Size::Lg => "lg",
            Size::Xl => "xl",
            Size::Xl2 => "2xl",
            Size::Xl3 => "3xl",
            Size::Xl4 => "4xl",
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heading level bounds
pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 6;
pub const FALLBACK_LEVEL: u8 = 2;

/// Interpret a JSON value as a heading level in 1–6
pub fn parse_level(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                let f = n.as_f64()?;
                if f.fract() != 0.0 {
                    return None;
                }
                f as i64
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if (MIN_LEVEL as i64..=MAX_LEVEL as i64).contains(&n) {
        Some(n as u8)
    } else {
        None
    }
}

/// Whether a prop key names a boolean flag
pub fn is_boolean_key(key: &str) -> bool {
    key == "showExplanations" || key == "showTimer" || key.starts_with("is") || key.starts_with("has")
}

/// Boolean words accepted in string form
pub fn parse_bool_word(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Normalize a single prop value. Returns `None` when the value is already
/// canonical (or not governed by the vocabulary).
///
/// String-typed `color`/`size` are normalized; numeric ones pass through
/// (geometry and image primitives use numeric sizes in pixels).
pub fn normalize_value(key: &str, value: &Value) -> Option<Value> {
    match (key, value) {
        ("color", Value::String(s)) => {
            let canonical = Color::parse(s).unwrap_or(Color::FALLBACK).as_str();
            (s != canonical).then(|| Value::String(canonical.to_string()))
        }
        ("size", Value::String(s)) => {
            let canonical = Size::parse(s).unwrap_or(Size::FALLBACK).as_str();
            (s != canonical).then(|| Value::String(canonical.to_string()))
        }
        ("level", Value::String(_)) | ("level", Value::Number(_)) => {
            let level = parse_level(value).unwrap_or(FALLBACK_LEVEL);
            let canonical = Value::from(level);
            (*value != canonical).then_some(canonical)
        }
        (key, Value::String(s)) if is_boolean_key(key) => parse_bool_word(s).map(Value::Bool),
        _ => None,
    }
}

/// A vocabulary rewrite applied to one prop
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub key: String,
    pub from: Value,
    pub to: Value,
}

/// Normalize the top-level keys of a props bag in place, returning what
/// changed. Nested objects are not visited.
pub fn normalize_props(props: &mut Props) -> Vec<Normalized> {
    let mut changes = Vec::new();
    for (key, value) in props.iter_mut() {
        if let Some(canonical) = normalize_value(key, value) {
            let from = std::mem::replace(value, canonical.clone());
            changes.push(Normalized {
                key: key.clone(),
                from,
                to: canonical,
            });
        }
    }
    changes
}

/// Whether a props bag is already canonical
pub fn is_canonical(props: &Props) -> bool {
    props.iter().all(|(k, v)| normalize_value(k, v).is_none())
}
