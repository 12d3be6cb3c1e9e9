//! Rendered output to static HTML
//!
//! No script, no inline event handlers, no style attributes. Every text
//! node and attribute value is escaped; only http(s) URLs are emitted.

use std::fmt::Write;

use serde_json::Value;

use super::layout::LayoutMeta;
use super::primitive::{is_safe_url, ImageSource, Primitive};
use super::{RenderedChild, RenderedNode, RenderedOutput};
use crate::parser::ast::Props;

/// Serialize rendered output as an HTML fragment
pub fn to_html(output: &RenderedOutput) -> String {
    let mut out = String::new();
    for node in &output.nodes {
        // Writing into a String cannot fail
        let _ = node_to_html(node, &mut out);
    }
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn data_attrs(node: &RenderedNode) -> String {
    let LayoutMeta {
        position,
        animation,
        delay_ms,
    } = node.layout;
    let mut attrs = format!(
        " data-component=\"{}\" data-key=\"{}\" data-animation=\"{}\" data-delay-ms=\"{}\"",
        node.kind,
        escape_html(&node.key),
        animation.as_str(),
        delay_ms
    );
    if let Some(p) = position {
        let _ = write!(attrs, " data-x=\"{}\" data-y=\"{}\"", p.x, p.y);
    }
    attrs
}

fn children_to_html(node: &RenderedNode, out: &mut String) -> std::fmt::Result {
    for child in &node.children {
        match child {
            RenderedChild::Text(text) => out.push_str(&escape_html(text)),
            RenderedChild::Node(n) => node_to_html(n, out)?,
        }
    }
    Ok(())
}

fn node_to_html(node: &RenderedNode, out: &mut String) -> std::fmt::Result {
    let data = data_attrs(node);
    match &node.primitive {
        Primitive::Card { color, class_name } => {
            let class = match class_name {
                Some(extra) => format!("card card-{} {}", color, extra),
                None => format!("card card-{}", color),
            };
            write!(out, "<div{} class=\"{}\">", data, escape_html(&class))?;
            children_to_html(node, out)?;
            write!(out, "</div>")?;
        }
        Primitive::Title { text, level, color } => {
            write!(
                out,
                "<h{lvl}{} class=\"title text-{}\">{}</h{lvl}>",
                data,
                color,
                escape_html(text),
                lvl = level
            )?;
        }
        Primitive::Text { content, color, size } => {
            write!(out, "<p{} class=\"text text-{} text-{}\">", data, color, size)?;
            if node.children.is_empty() {
                out.push_str(&escape_html(content.as_deref().unwrap_or("")));
            } else {
                children_to_html(node, out)?;
            }
            write!(out, "</p>")?;
        }
        Primitive::List { items, color } => {
            write!(out, "<ul{} class=\"list text-{}\">", data, color)?;
            for item in items {
                write!(out, "<li>{}</li>", escape_html(item))?;
            }
            write!(out, "</ul>")?;
        }
        Primitive::Button { label, color } => {
            write!(out, "<button{} type=\"button\" class=\"button button-{}\">", data, color)?;
            if node.children.is_empty() {
                out.push_str(&escape_html(label.as_deref().unwrap_or("")));
            } else {
                children_to_html(node, out)?;
            }
            write!(out, "</button>")?;
        }
        Primitive::Input { placeholder, color } => {
            write!(
                out,
                "<input{} type=\"text\" class=\"input input-{}\" placeholder=\"{}\">",
                data,
                color,
                escape_html(placeholder)
            )?;
        }
        Primitive::Image {
            image,
            alt,
            width,
            height,
        } => {
            let mut attrs = format!(" alt=\"{}\"", escape_html(alt));
            if let Some(w) = width {
                let _ = write!(attrs, " width=\"{}\"", w);
            }
            if let Some(h) = height {
                let _ = write!(attrs, " height=\"{}\"", h);
            }
            match image {
                ImageSource::Url(url) => {
                    write!(out, "<img{} src=\"{}\"{}>", data, escape_html(url), attrs)?
                }
                ImageSource::Search(query) => write!(
                    out,
                    "<img{} data-search-query=\"{}\"{}>",
                    data,
                    escape_html(query),
                    attrs
                )?,
                ImageSource::Missing => write!(out, "<img{}{}>", data, attrs)?,
            }
        }
        Primitive::Fraction {
            numerator,
            denominator,
            show_visual,
            color,
        } => {
            write!(
                out,
                "<div{} class=\"fraction text-{}\" data-visual=\"{}\"><sup>{}</sup>&frasl;<sub>{}</sub></div>",
                data, color, show_visual, numerator, denominator
            )?;
        }
        Primitive::Equation {
            equation,
            animated,
            color,
        } => {
            write!(
                out,
                "<div{} class=\"equation text-{}\" data-animated=\"{}\">{}</div>",
                data,
                color,
                animated,
                escape_html(equation)
            )?;
        }
        Primitive::Widget { props, .. } => {
            write!(
                out,
                "<div{} class=\"widget\" data-props=\"{}\">",
                data,
                escape_html(&Value::Object(props.clone()).to_string())
            )?;
            children_to_html(node, out)?;
            write!(out, "</div>")?;
        }
        Primitive::Element { tag, attrs } => {
            write!(out, "<{}{}{}>", tag, data, element_attrs(attrs))?;
            children_to_html(node, out)?;
            write!(out, "</{}>", tag)?;
        }
    }
    Ok(())
}

/// Attributes the renderer sets itself
const RESERVED_ATTRS: &[&str] = &[
    "data-component",
    "data-key",
    "data-animation",
    "data-delay-ms",
    "data-x",
    "data-y",
];

/// Attributes of a passthrough tag, filtered to a safe subset
fn element_attrs(attrs: &Props) -> String {
    let mut out = String::new();
    for (name, value) in attrs {
        let name = if name == "className" { "class" } else { name.as_str() };
        if !is_safe_attr_name(name) {
            continue;
        }
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if matches!(name, "href" | "src") && !is_safe_url(&text) {
            continue;
        }
        let _ = write!(out, " {}=\"{}\"", name, escape_html(&text));
    }
    out
}

fn is_safe_attr_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.is_empty()
        && !lower.starts_with("on")
        && lower != "style"
        && lower != "children"
        && !RESERVED_ATTRS.contains(&lower.as_str())
        && lower
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
        && lower.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::render;
    use crate::repair::repair;
    use serde_json::json;

    fn html(value: Value) -> String {
        to_html(&render(&repair(&value).components))
    }

    #[test]
    fn test_card_with_children() {
        let out = html(json!({"components": [{
            "type": "FloatingCard", "props": {"color": "purple"},
            "children": [{"type": "FloatingTitle", "props": {"text": "Fractions", "level": 2}}]
        }]}));
        assert!(out.starts_with("<div data-component=\"FloatingCard\" data-key=\"0\""));
        assert!(out.contains("class=\"card card-purple\""));
        assert!(out.contains("<h2 data-component=\"FloatingTitle\" data-key=\"0.0\""));
        assert!(out.contains(">Fractions</h2>"));
        assert!(out.ends_with("</div>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let out = html(json!({"components": [
            {"type": "FloatingText", "props": {"children": "<script>alert('x')</script>"}}
        ]}));
        assert!(!out.contains("<script>"));
        assert!(out.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
    }

    #[test]
    fn test_passthrough_attrs_filtered() {
        let out = html(json!({"components": [{
            "type": "div",
            "props": {
                "className": "row",
                "onclick": "steal()",
                "style": "background:url(javascript:x)",
                "href": "javascript:alert(1)",
                "title": "\"quoted\""
            },
            "children": ["ok"]
        }]}));
        assert!(out.contains("class=\"row\""));
        assert!(out.contains("title=\"&quot;quoted&quot;\""));
        assert!(!out.contains("onclick"));
        assert!(!out.contains("style="));
        assert!(!out.contains("javascript"));
        assert!(out.contains(">ok</div>"));
    }

    #[test]
    fn test_list_items() {
        let out = html(json!({"components": [{"type": "FloatingList", "props": {"items": ["a", "b & c"]}}]}));
        assert!(out.contains("<li>a</li><li>b &amp; c</li>"));
    }

    #[test]
    fn test_delay_attribute() {
        let out = html(json!({"components": [
            {"type": "FloatingText", "props": {}},
            {"type": "FloatingText", "props": {}}
        ]}));
        assert!(out.contains("data-key=\"1\" data-animation=\"sparkle\" data-delay-ms=\"100\""));
    }
}
