//! Turn pipeline - transcript to validated response, and session commits
//!
//! # Within a turn
//!
//! ```text
//! retrieval → resolver → lenient parse → validate/repair → response
//!                              ↓ (unparseable)
//!                          escalation (one retry)
//! ```
//!
//! Every suspend point is bounded by the pipeline timeout. Every failure
//! becomes the error card; `process` never returns an error.
//!
//! # Across turns
//!
//! `Session::submit` tags each request with a monotonically increasing turn
//! id. A response is committed only if no newer turn was issued while it was
//! in flight; otherwise it is discarded as stale. A commit replaces the
//! current rendered output wholesale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::escalation::escalate_repair_with;
use crate::history::ConversationMemory;
use crate::llm::CompletionModel;
use crate::parser::ast::{GeneratorResponse, Props};
use crate::parser::parse_lenient;
use crate::renderer::registry::schema_description;
use crate::renderer::{RenderedOutput, Renderer};
use crate::repair::{error_response, is_error_response, repair_with_notes, RepairNote};
use crate::resolver::{IntentContext, IntentResolver};
use crate::retrieval::{enrich_context, ContextSearch};
use crate::user_state::{UserStatePatch, UserStateStore};
use crate::validator::validate;
use crate::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the response of a turn was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Generator output was already valid and canonical
    Valid,
    /// Local repair was needed
    Repaired,
    /// Parsing failed and the escalation call produced the tree
    Escalated,
    /// The error card
    Failed,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResponseSource::Valid => write!(f, "valid"),
            ResponseSource::Repaired => write!(f, "repaired"),
            ResponseSource::Escalated => write!(f, "escalated"),
            ResponseSource::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub response: GeneratorResponse,
    pub source: ResponseSource,
    pub notes: Vec<RepairNote>,
}

impl TurnResult {
    fn failed(error: &Error) -> Self {
        TurnResult {
            response: error_response(&error.to_string()),
            source: ResponseSource::Failed,
            notes: Vec::new(),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────

pub struct Pipeline {
    resolver: Arc<dyn IntentResolver>,
    escalation: Option<(Arc<dyn CompletionModel>, Option<String>)>,
    retrieval: Option<(Arc<dyn ContextSearch>, usize)>,
    timeout: Duration,
    schema: String,
}

impl Pipeline {
    pub fn new(resolver: Arc<dyn IntentResolver>) -> Self {
        Pipeline {
            resolver,
            escalation: None,
            retrieval: None,
            timeout: DEFAULT_TIMEOUT,
            schema: schema_description(),
        }
    }

    /// Enable the repair escalation call, optionally on a named model
    pub fn with_escalation(mut self, model: Arc<dyn CompletionModel>, model_name: Option<String>) -> Self {
        self.escalation = Some((model, model_name));
        self
    }

    pub fn with_retrieval(mut self, search: Arc<dyn ContextSearch>, k: usize) -> Self {
        self.retrieval = Some((search, k));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn timeout_error(&self, operation: &str) -> Error {
        Error::Timeout {
            operation: operation.into(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Run one turn; always yields a valid response
    pub async fn process(&self, transcript: &str, mut context: IntentContext) -> TurnResult {
        if let Some((search, k)) = &self.retrieval {
            match timeout(self.timeout, enrich_context(search.as_ref(), transcript, *k)).await {
                Ok(chunks) => context.documents.extend(chunks),
                Err(_) => warn!("retrieval timed out, continuing without context"),
            }
        }

        let raw = match timeout(self.timeout, self.resolver.resolve(transcript, &context)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                error!(error = %e, "intent resolution failed");
                return TurnResult::failed(&e);
            }
            Err(_) => {
                let e = self.timeout_error("intent resolution");
                error!(error = %e, "intent resolution timed out");
                return TurnResult::failed(&e);
            }
        };

        self.handle_raw(&raw).await
    }

    /// Turn raw generator text into a response
    ///
    /// Escalates when no JSON can be recovered locally: the text does not
    /// parse, or it parses to a JSON string whose content does not.
    pub async fn handle_raw(&self, raw: &str) -> TurnResult {
        let value = match parse_lenient(raw) {
            Ok(value) => value,
            Err(parse_error) => return self.escalate(raw, &parse_error).await,
        };

        let report = validate(&value);
        debug!(
            errors = report.errors().len(),
            warnings = report.warnings().len(),
            "generator output checked"
        );
        let (response, notes) = repair_with_notes(&value);
        if is_error_response(&response) && value.is_string() {
            let e = Error::ParseError("generator returned a string without recoverable JSON".into());
            return self.escalate(raw, &e).await;
        }

        let source = if is_error_response(&response) {
            ResponseSource::Failed
        } else if notes.is_empty() {
            ResponseSource::Valid
        } else {
            ResponseSource::Repaired
        };
        TurnResult {
            response,
            source,
            notes,
        }
    }

    async fn escalate(&self, raw: &str, parse_error: &Error) -> TurnResult {
        let Some((model, model_name)) = &self.escalation else {
            warn!(error = %parse_error, "unparseable output and no escalation configured");
            return TurnResult::failed(parse_error);
        };
        let escalation = escalate_repair_with(model.as_ref(), raw, &self.schema, model_name.as_deref());
        match timeout(self.timeout, escalation).await {
            Ok(response) => {
                let source = if is_error_response(&response) {
                    ResponseSource::Failed
                } else {
                    ResponseSource::Escalated
                };
                TurnResult {
                    response,
                    source,
                    notes: Vec::new(),
                }
            }
            Err(_) => {
                let e = self.timeout_error("repair escalation");
                warn!(error = %e, "escalation timed out");
                TurnResult::failed(&e)
            }
        }
    }
}

// ── Session ───────────────────────────────────────────────

/// The output currently on screen
#[derive(Debug, Clone)]
pub struct CommittedTurn {
    pub turn_id: u64,
    pub transcript: String,
    pub response: GeneratorResponse,
    pub rendered: RenderedOutput,
    pub source: ResponseSource,
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Committed(CommittedTurn),
    /// A newer turn was issued while this one was in flight
    Stale { turn_id: u64, latest: u64 },
}

impl TurnOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self, TurnOutcome::Stale { .. })
    }
}

struct SessionState {
    current: Option<CommittedTurn>,
    history: ConversationMemory,
}

pub struct Session {
    pipeline: Pipeline,
    renderer: Renderer,
    store: Arc<dyn UserStateStore>,
    latest_turn: AtomicU64,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(pipeline: Pipeline, renderer: Renderer, store: Arc<dyn UserStateStore>, history_size: usize) -> Self {
        Session {
            pipeline,
            renderer,
            store,
            latest_turn: AtomicU64::new(0),
            state: Mutex::new(SessionState {
                current: None,
                history: ConversationMemory::with_max_size(history_size),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStateStore> {
        &self.store
    }

    /// Run a turn and commit it unless a newer turn was issued meanwhile
    pub async fn submit(&self, transcript: &str) -> TurnOutcome {
        let turn_id = self.latest_turn.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(turn_id, "turn started");

        let history = self.state.lock().await.history.to_messages();
        let user_summary = match self.with_store(|store| store.get()).await {
            Ok(user) => Some(user.prompt_summary()),
            Err(e) => {
                warn!(error = %e, "user state unavailable");
                None
            }
        };
        let context = IntentContext {
            history,
            documents: Vec::new(),
            user_summary,
        };

        let result = self.pipeline.process(transcript, context).await;

        let mut state = self.state.lock().await;
        let latest = self.latest_turn.load(Ordering::SeqCst);
        if latest != turn_id {
            debug!(turn_id, latest, "stale turn discarded");
            return TurnOutcome::Stale { turn_id, latest };
        }

        let patch = result.response.user_state.as_ref().and_then(user_state_patch);
        let stored = self
            .with_store(move |store| {
                if let Some(patch) = &patch {
                    store.set(patch)?;
                }
                store.record_interaction()
            })
            .await;
        if let Err(e) = stored {
            warn!(error = %e, "could not save user state");
        }

        state.history.add_user_message(transcript);
        state.history.add_assistant_message(result.response.to_json());

        let committed = CommittedTurn {
            turn_id,
            transcript: transcript.to_string(),
            rendered: self.renderer.render(&result.response.components),
            response: result.response,
            source: result.source,
        };
        info!(turn_id, source = %committed.source, nodes = committed.rendered.nodes.len(), "turn committed");
        state.current = Some(committed.clone());
        TurnOutcome::Committed(committed)
    }

    /// Run a store operation on the blocking pool; stores may do file I/O
    async fn with_store<T, F>(&self, op: F) -> crate::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn UserStateStore) -> crate::Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| Error::StorageError(format!("user state task failed: {}", e)))?
    }

    /// Output of the last committed turn
    pub async fn current(&self) -> Option<CommittedTurn> {
        self.state.lock().await.current.clone()
    }

    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    pub fn latest_turn_id(&self) -> u64 {
        self.latest_turn.load(Ordering::SeqCst)
    }
}

fn user_state_patch(props: &Props) -> Option<UserStatePatch> {
    let (patch, rejected) = UserStatePatch::from_props(props);
    if !rejected.is_empty() {
        warn!(sections = ?rejected, "userState sections ignored");
    }
    (!patch.is_empty()).then_some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatOptions, MockModel};
    use crate::resolver::LlmIntentResolver;
    use crate::retrieval::{Document, DocumentIndex};
    use crate::user_state::{FileUserStateStore, MemoryUserStateStore};

    fn pipeline_with(model: MockModel) -> (Pipeline, Arc<MockModel>) {
        let model = Arc::new(model);
        let resolver = LlmIntentResolver::new(model.clone(), ChatOptions::default());
        (Pipeline::new(Arc::new(resolver)), model)
    }

    #[tokio::test]
    async fn test_valid_output() {
        let (pipeline, _) = pipeline_with(
            MockModel::new().with_reply(r#"{"components":[{"type":"FloatingText","props":{"children":"hi"}}]}"#),
        );
        let result = pipeline.process("hello", IntentContext::default()).await;
        assert_eq!(result.source, ResponseSource::Valid);
        assert_eq!(result.response.components[0].kind, "FloatingText");
    }

    #[tokio::test]
    async fn test_repaired_output() {
        let (pipeline, _) = pipeline_with(
            MockModel::new().with_reply("Sure: {'components': [{'type': 'FloatingCard', 'props': {'color': 'Neon'},}]}"),
        );
        let result = pipeline.process("hello", IntentContext::default()).await;
        assert_eq!(result.source, ResponseSource::Repaired);
        assert_eq!(result.response.components[0].props["color"], "blue");
    }

    #[tokio::test]
    async fn test_unparseable_escalates_once() {
        let (pipeline, _) = pipeline_with(MockModel::new().with_reply("{\"components\": [{\"type\": "));
        let fixer = Arc::new(MockModel::new().with_reply(r#"{"components":[{"type":"FloatingCard","props":{}}]}"#));
        let pipeline = pipeline.with_escalation(fixer.clone(), Some("gpt-4.1-nano".into()));

        let result = pipeline.process("hello", IntentContext::default()).await;
        assert_eq!(result.source, ResponseSource::Escalated);
        assert_eq!(fixer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_string_with_broken_json_escalates() {
        let (pipeline, _) = pipeline_with(MockModel::new().with_reply(r#""{\"components\": [{\"type\": ""#));
        let fixer = Arc::new(MockModel::new().with_reply(r#"{"components":[{"type":"FloatingText","props":{}}]}"#));
        let pipeline = pipeline.with_escalation(fixer.clone(), None);

        let result = pipeline.process("hello", IntentContext::default()).await;
        assert_eq!(fixer.call_count(), 1);
        assert_eq!(result.source, ResponseSource::Escalated);
        assert_eq!(result.response.components[0].kind, "FloatingText");
    }

    #[tokio::test]
    async fn test_unparseable_without_escalation_is_error_card() {
        let (pipeline, _) = pipeline_with(MockModel::new().with_reply("no json here"));
        let result = pipeline.process("hello", IntentContext::default()).await;
        assert_eq!(result.source, ResponseSource::Failed);
        assert!(is_error_response(&result.response));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_error_card() {
        let (pipeline, _) = pipeline_with(MockModel::new().with_error(Error::upstream("chat", "401 Unauthorized")));
        let result = pipeline.process("hello", IntentContext::default()).await;
        assert_eq!(result.source, ResponseSource::Failed);
        assert!(is_error_response(&result.response));
    }

    #[tokio::test]
    async fn test_resolver_timeout_is_error_card() {
        let (pipeline, _) = pipeline_with(
            MockModel::new()
                .with_reply(r#"{"components":[]}"#)
                .with_delay(Duration::from_millis(200)),
        );
        let pipeline = pipeline.with_timeout(Duration::from_millis(20));
        let result = pipeline.process("hello", IntentContext::default()).await;
        assert_eq!(result.source, ResponseSource::Failed);
    }

    #[tokio::test]
    async fn test_retrieved_context_reaches_prompt() {
        let index = Arc::new(DocumentIndex::new());
        index
            .init(&[Document::new("COMPONENTS.md", "### FloatingFraction\nShows numerator over denominator.\n")])
            .unwrap();
        let (pipeline, model) = pipeline_with(MockModel::new().with_reply(r#"{"components":[]}"#));
        let pipeline = pipeline.with_retrieval(index, 3);

        pipeline.process("show a fraction numerator", IntentContext::default()).await;
        let (messages, _) = &model.calls()[0];
        assert!(messages.last().unwrap().content.contains("Shows numerator over denominator."));
    }

    #[tokio::test]
    async fn test_session_commits_and_applies_user_state() {
        let (pipeline, _) = pipeline_with(MockModel::new().with_reply(
            r#"{"components":[{"type":"FloatingText","props":{}}],"userState":{"profile":{"name":"Sam"}}}"#,
        ));
        let store = Arc::new(MemoryUserStateStore::default());
        let session = Session::new(pipeline, Renderer::default(), store.clone(), 10);

        let outcome = session.submit("je m'appelle Sam").await;
        let TurnOutcome::Committed(turn) = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(turn.turn_id, 1);
        assert_eq!(turn.rendered.nodes.len(), 1);
        assert_eq!(store.get().unwrap().profile.name, "Sam");
        assert_eq!(store.get().unwrap().stats.total_interactions, 1);
        assert_eq!(session.history_len().await, 2);
        assert_eq!(session.current().await.unwrap().turn_id, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");
        let (pipeline, _) = pipeline_with(
            MockModel::new()
                .with_reply(r#"{"components":[],"userState":{"topics":["fractions"]}}"#)
                .with_reply(r#"{"components":[]}"#),
        );
        let store = Arc::new(FileUserStateStore::new(&path));
        let session = Session::new(pipeline, Renderer::default(), store, 10);

        assert!(!session.submit("fractions").await.is_stale());
        assert!(!session.submit("encore").await.is_stale());

        let saved = FileUserStateStore::new(&path).get().unwrap();
        assert_eq!(saved.topics, vec!["fractions".to_string()]);
        assert_eq!(saved.stats.total_interactions, 2);
    }

    #[tokio::test]
    async fn test_stale_turn_discarded() {
        let slow = MockModel::new()
            .with_reply(r#"{"components":[{"type":"FloatingText","props":{"children":"old"}}]}"#)
            .with_delay(Duration::from_millis(150));
        let slow_pipeline = pipeline_with(slow).0;
        let session = Arc::new(Session::new(
            slow_pipeline,
            Renderer::default(),
            Arc::new(MemoryUserStateStore::default()),
            10,
        ));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.submit("first").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The second turn finds no scripted reply and commits the error card
        let second = session.submit("second").await;
        let first = first.await.unwrap();

        assert!(first.is_stale());
        assert!(matches!(second, TurnOutcome::Committed(ref t) if t.turn_id == 2));
        assert_eq!(session.current().await.unwrap().turn_id, 2);
    }
}
