//! Intent resolution - transcript to raw generator text
//!
//! The resolver only produces text. Its output is never trusted and always
//! goes through the lenient parser, the validator and the repairer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{ChatMessage, ChatOptions, CompletionModel};
use crate::renderer::registry::schema_description;
use crate::retrieval::ContextChunk;
use crate::Result;

/// Everything the resolver may use besides the transcript
#[derive(Debug, Clone, Default)]
pub struct IntentContext {
    pub history: Vec<ChatMessage>,
    pub documents: Vec<ContextChunk>,
    /// Learner summary from the user-state service
    pub user_summary: Option<String>,
}

#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(&self, transcript: &str, context: &IntentContext) -> Result<String>;
}

/// Resolver backed by a chat-completion model
pub struct LlmIntentResolver {
    model: Arc<dyn CompletionModel>,
    options: ChatOptions,
}

impl LlmIntentResolver {
    pub fn new(model: Arc<dyn CompletionModel>, options: ChatOptions) -> Self {
        LlmIntentResolver { model, options }
    }

    pub fn model(&self) -> &Arc<dyn CompletionModel> {
        &self.model
    }
}

#[async_trait]
impl IntentResolver for LlmIntentResolver {
    async fn resolve(&self, transcript: &str, context: &IntentContext) -> Result<String> {
        let messages = build_messages(transcript, context);
        self.model.complete(&messages, &self.options).await
    }
}

/// System prompt: role, component schema and learner summary
pub fn system_prompt(user_summary: Option<&str>) -> String {
    let mut prompt = String::from(
        "You generate user interfaces for an educational assistant from spoken intents.\n\
         Analyse the transcript and answer with JSON describing the components to display.\n\n",
    );
    prompt.push_str(&schema_description());
    if let Some(summary) = user_summary.filter(|s| !s.is_empty()) {
        prompt.push_str("\nAbout the learner:\n");
        prompt.push_str(summary);
        prompt.push('\n');
        prompt.push_str(
            "You may return a 'userState' object next to 'components' to update the learner profile.\n",
        );
    }
    prompt.push_str("\nReturn ONLY the JSON object.");
    prompt
}

/// Full message list: system prompt, history, then the user turn
pub fn build_messages(transcript: &str, context: &IntentContext) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(context.history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(context.user_summary.as_deref())));
    messages.extend(context.history.iter().cloned());

    let mut user = format!("Transcript: \"{}\"\n", transcript);
    if !context.documents.is_empty() {
        user.push_str("\nRelevant documentation:\n");
        for chunk in &context.documents {
            user.push_str("---\n");
            user.push_str(chunk.content.trim());
            user.push('\n');
        }
    }
    user.push_str("\nGenerate the appropriate UI components for this transcript.");
    messages.push(ChatMessage::user(user));
    messages
}
