//! IntentUI Core - turning language-model output into a renderable component tree
//!
//! Generator output is never trusted. Whatever text comes back is parsed
//! leniently, checked against the component tree schema and repaired into a
//! tree the renderer can always display.
//!
//! # Architecture
//!
//! ```text
//! Transcript → Retrieval → Resolver → raw text
//!                                        ↓
//!                          Lenient Parser → Validator / Repair → GeneratorResponse
//!                                        ↓ (unparseable)          ↓
//!                                   Escalation               Renderer → RenderedOutput → HTML
//!                                                                ↓
//!                                                      Session (turn ids, user state, history)
//! ```
//!
//! # Guarantees
//!
//! - **Total**: repair returns a valid response for every JSON value
//! - **Idempotent**: repairing a repaired response changes nothing
//! - **Deterministic**: same input always produces identical output
//! - **Isolated**: a malformed node is skipped without affecting its siblings
//! - **Ordered**: a response from an older turn never replaces a newer one

pub mod config;
pub mod error;
pub mod escalation;
pub mod history;
pub mod llm;
pub mod parser;
pub mod pipeline;
pub mod renderer;
pub mod repair;
pub mod resolver;
pub mod retrieval;
pub mod user_state;
pub mod validator;
pub mod vocabulary;

pub use error::{Error, Result};
pub use parser::ast::*;
pub use pipeline::{Pipeline, ResponseSource, Session, TurnOutcome, TurnResult};
pub use renderer::{RenderedOutput, Renderer};
pub use repair::{error_response, repair, repair_with_notes};
pub use validator::{is_valid_tree, validate};

/// Parse, repair and render raw generator text without any network call
///
/// Unparseable text yields the error card.
pub fn process_text(text: &str, renderer: &Renderer) -> (GeneratorResponse, RenderedOutput) {
    let response = match parser::parse_lenient(text) {
        Ok(value) => repair(&value),
        Err(e) => error_response(&e.to_string()),
    };
    let rendered = renderer.render(&response.components);
    (response, rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LESSON: &str = r#"Voici l'interface:
```json
{'components': [
  {'type': 'FloatingCard', 'props': {'color': 'Purple'}, 'children': [
    {'type': 'FloatingTitle', 'props': {'children': 'Les fractions', 'level': '2'}},
    {'type': 'FloatingFraction', 'props': {'numerator': 1, 'denominator': 2}},
  ]},
]}
```"#;

    #[test]
    fn test_process_text_repairs_and_renders() {
        let (response, rendered) = process_text(LESSON, &Renderer::default());
        assert!(is_valid_tree(&response.to_value()));
        assert_eq!(response.components[0].props["color"], "purple");
        assert_eq!(rendered.nodes.len(), 1);
        assert_eq!(rendered.nodes[0].children.len(), 2);
    }

    #[test]
    fn test_process_text_unparseable_is_error_card() {
        let (response, rendered) = process_text("désolé, je ne peux pas", &Renderer::default());
        assert!(repair::is_error_response(&response));
        assert_eq!(rendered.nodes.len(), 1);
    }

    #[test]
    fn test_determinism_100_iterations() {
        let view = Renderer::default();
        let (first, first_rendered) = process_text(LESSON, &view);
        let first_html = renderer::html::to_html(&first_rendered);
        for i in 0..100 {
            let (response, rendered) = process_text(LESSON, &view);
            assert_eq!(first.fingerprint(), response.fingerprint(), "Non-determinism at iteration {}", i);
            assert_eq!(first_html, renderer::html::to_html(&rendered), "Non-determinism at iteration {}", i);
        }
    }
}
