//! Chat-completion client and the model trait the pipeline depends on

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as Http;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatOptions {
    /// Overrides the client's model for this call
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Anything that turns a chat transcript into reply text
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String>;

    fn name(&self) -> &str;
}

// ── OpenAI-compatible client ──────────────────────────────

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: Http,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    defaults: ChatOptions,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Http::builder()
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("http client: {}", e)))?;
        Ok(OpenAiClient {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            defaults: ChatOptions::default(),
        })
    }

    /// Options applied when a call leaves a field unset
    pub fn with_defaults(mut self, defaults: ChatOptions) -> Self {
        self.defaults = defaults;
        self
    }

    fn request_body(&self, messages: &[ChatMessage], options: &ChatOptions) -> Value {
        let model = options
            .model
            .as_deref()
            .or(self.defaults.model.as_deref())
            .unwrap_or(&self.model);
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = options.temperature.or(self.defaults.temperature) {
                obj.insert("temperature".into(), json!(t));
            }
            if let Some(n) = options.max_tokens.or(self.defaults.max_tokens) {
                obj.insert("max_tokens".into(), json!(n));
            }
        }
        body
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, options);
        debug!(model = %body["model"], messages = messages.len(), "chat completion request");

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        operation: "chat completion".into(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    Error::upstream("chat", format!("request failed: {}", e))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(%status, "chat completion rejected");
            return Err(Error::upstream("chat", format!("{}: {}", status, text)));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::upstream("chat", format!("invalid json: {}", e)))?;
        extract_content(&v)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Reply text of a chat-completions response body
pub fn extract_content(response: &Value) -> Result<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::upstream("chat", "missing choices[0].message.content"))
}

// ── Mock model ────────────────────────────────────────────

/// Scripted model for tests: pops one reply per call and records prompts
pub struct MockModel {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, ChatOptions)>>,
    delay: Option<Duration>,
}

impl MockModel {
    pub fn new() -> Self {
        MockModel {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    pub fn with_error(self, error: Error) -> Self {
        self.push(Err(error));
        self
    }

    /// Sleep before answering, to exercise timeouts and turn ordering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, reply: Result<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, ChatOptions)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionModel for MockModel {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((messages.to_vec(), options.clone()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| Err(Error::upstream("mock", "no scripted reply left")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
