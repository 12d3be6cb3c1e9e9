//! Generator-repair escalation - one model-assisted retry
//!
//! Used only when local parsing fails outright. The malformed text and the
//! schema description go to a secondary completion call at low temperature;
//! the reply is parsed leniently and repaired. There is no second retry:
//! any failure here yields the error card.
//!
//! Callers bound the whole call with a timeout.

use tracing::{info, warn};

use crate::llm::{ChatMessage, ChatOptions, CompletionModel};
use crate::parser::ast::GeneratorResponse;
use crate::parser::parse_lenient;
use crate::repair::{error_response, repair};

/// Temperature of the correction call
pub const ESCALATION_TEMPERATURE: f32 = 0.3;

/// Model used for the correction call unless configured otherwise
pub const DEFAULT_REPAIR_MODEL: &str = "gpt-4.1-nano";

/// Ask a model to correct malformed generator output, then repair its reply
pub async fn escalate_repair(
    model: &dyn CompletionModel,
    raw_text: &str,
    schema_description: &str,
) -> GeneratorResponse {
    escalate_repair_with(model, raw_text, schema_description, None).await
}

/// Same as [`escalate_repair`], with an explicit model name for the call
pub async fn escalate_repair_with(
    model: &dyn CompletionModel,
    raw_text: &str,
    schema_description: &str,
    model_name: Option<&str>,
) -> GeneratorResponse {
    info!(model = model.name(), bytes = raw_text.len(), "escalating unparseable output");

    let messages = correction_prompt(raw_text, schema_description);
    let options = ChatOptions {
        model: model_name.map(str::to_string),
        temperature: Some(ESCALATION_TEMPERATURE),
        max_tokens: None,
    };

    let reply = match model.complete(&messages, &options).await {
        Ok(reply) if !reply.trim().is_empty() => reply,
        Ok(_) => {
            warn!("correction call returned an empty reply");
            return error_response("empty reply from the correction model");
        }
        Err(e) => {
            warn!(error = %e, "correction call failed");
            return error_response(&e.to_string());
        }
    };

    match parse_lenient(&reply) {
        Ok(value) => repair(&value),
        Err(e) => {
            warn!(error = %e, "correction reply is still not JSON");
            error_response("the corrected output could not be parsed")
        }
    }
}

/// System and user messages of the correction call
pub fn correction_prompt(raw_text: &str, schema_description: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You are a JSON correction expert. Fix the JSON you are given so that it matches \
             the expected structure without changing its meaning. If content is empty or \
             incomplete, fill it in consistently with the rest.\n{}\n\
             Return ONLY the corrected JSON, with no text before or after.",
            schema_description
        )),
        ChatMessage::user(format!(
            "Here is JSON that may be malformed. Correct it to match the expected structure:\n\n{}",
            raw_text
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModel, Role};
    use crate::renderer::registry::schema_description;
    use crate::repair::is_error_response;
    use crate::validator::is_valid_tree;
    use crate::Error;

    const BROKEN: &str = r#"{"components": [{"type": "FloatingCard", "props": {"#;

    #[tokio::test]
    async fn test_escalation_success() {
        let model = MockModel::new().with_reply(
            "Here is the fix:\n{\"components\": [{\"type\": \"FloatingCard\", \"props\": {\"color\": \"Blue\"}}]}",
        );
        let response = escalate_repair(&model, BROKEN, &schema_description()).await;
        assert!(!is_error_response(&response));
        assert_eq!(response.components[0].kind, "FloatingCard");
        assert_eq!(response.components[0].props["color"], "blue");
    }

    #[tokio::test]
    async fn test_escalation_uses_low_temperature_and_schema() {
        let model = MockModel::new().with_reply(r#"{"components": []}"#);
        escalate_repair_with(&model, BROKEN, "SCHEMA-TEXT", Some("gpt-4.1-nano")).await;

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let (messages, options) = &calls[0];
        assert_eq!(options.temperature, Some(ESCALATION_TEMPERATURE));
        assert_eq!(options.model.as_deref(), Some("gpt-4.1-nano"));
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("SCHEMA-TEXT"));
        assert!(messages[1].content.contains(BROKEN));
    }

    #[tokio::test]
    async fn test_escalation_single_retry_on_garbage() {
        let model = MockModel::new()
            .with_reply("still not json")
            .with_reply(r#"{"components": []}"#);
        let response = escalate_repair(&model, BROKEN, "schema").await;
        assert!(is_error_response(&response));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_escalation_upstream_failure_is_error_card() {
        let model = MockModel::new().with_error(Error::upstream("chat", "401 Unauthorized"));
        let response = escalate_repair(&model, BROKEN, "schema").await;
        assert!(is_error_response(&response));
        assert!(is_valid_tree(&response.to_value()));
    }

    #[tokio::test]
    async fn test_escalation_empty_reply_is_error_card() {
        let model = MockModel::new().with_reply("   ");
        let response = escalate_repair(&model, BROKEN, "schema").await;
        assert!(is_error_response(&response));
    }
}
