//! Per-user profile, preferences and learning path
//!
//! The generator may return a `userState` object alongside its components.
//! It is applied as a patch: each section is merged field by field, `topics`
//! is replaced wholesale, and `learningPath.steps` is replaced only when the
//! patch provides it. A section that does not fit the schema is rejected on
//! its own; the other sections still apply.

use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::parser::ast::Props;
use crate::{Error, Result};

// ── State ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub name: String,
    pub age: Option<u32>,
    pub education_level: Option<String>,
    pub mood: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub content_type: String,
    pub detail_level: String,
    pub learning_style: String,
    pub examples: bool,
    pub quizzes: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            content_type: "mixed".into(),
            detail_level: "standard".into(),
            learning_style: "mixed".into(),
            examples: true,
            quizzes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningPathStep {
    pub title: String,
    pub description: String,
    pub objectives: Vec<String>,
    pub difficulty: String,
    /// Minutes
    pub estimated_duration: u32,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningPath {
    pub defined: bool,
    pub current_step_index: usize,
    pub topic: String,
    pub steps: Vec<LearningPathStep>,
}

impl LearningPath {
    pub fn current_step(&self) -> Option<&LearningPathStep> {
        self.steps.get(self.current_step_index)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub sessions_count: u32,
    pub last_session_date: Option<String>,
    pub total_interactions: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserState {
    pub profile: Profile,
    pub preferences: Preferences,
    pub learning_path: LearningPath,
    pub topics: Vec<String>,
    pub stats: Stats,
}

// ── Patch ─────────────────────────────────────────────────

/// Partial update as emitted by the generator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStatePatch {
    pub profile: Option<Props>,
    pub preferences: Option<Props>,
    pub learning_path: Option<Props>,
    pub topics: Option<Vec<String>>,
    pub stats: Option<Props>,
}

impl UserStatePatch {
    /// Read a patch from an opaque `userState` object. Sections of the
    /// wrong JSON type are left out and named in the second value.
    pub fn from_props(props: &Props) -> (UserStatePatch, Vec<String>) {
        let mut patch = UserStatePatch::default();
        let mut rejected = Vec::new();
        for (key, value) in props {
            let ok = match key.as_str() {
                "profile" => section(value).map(|p| patch.profile = Some(p)),
                "preferences" => section(value).map(|p| patch.preferences = Some(p)),
                "learningPath" => section(value).map(|p| patch.learning_path = Some(p)),
                "stats" => section(value).map(|p| patch.stats = Some(p)),
                "topics" => serde_json::from_value(value.clone())
                    .ok()
                    .map(|t| patch.topics = Some(t)),
                _ => {
                    debug!(key = %key, "ignoring unknown userState key");
                    Some(())
                }
            };
            if ok.is_none() {
                rejected.push(key.clone());
            }
        }
        (patch, rejected)
    }

    pub fn is_empty(&self) -> bool {
        *self == UserStatePatch::default()
    }
}

fn section(value: &Value) -> Option<Props> {
    value.as_object().cloned()
}

/// Overlay `patch` onto the JSON form of `current` and read it back
fn merge_section<T: Serialize + DeserializeOwned>(current: &T, patch: &Props, name: &str) -> Result<T> {
    let mut merged = match serde_json::to_value(current)? {
        Value::Object(obj) => obj,
        _ => Props::new(),
    };
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| Error::SchemaError(format!("userState.{}: {}", name, e)))
}

fn merge_into<T: Serialize + DeserializeOwned>(
    target: &mut T,
    patch: Option<&Props>,
    name: &str,
    rejected: &mut Vec<String>,
) {
    let Some(patch) = patch else { return };
    match merge_section(target, patch, name) {
        Ok(merged) => *target = merged,
        Err(e) => {
            warn!(error = %e, "userState section rejected");
            rejected.push(name.to_string());
        }
    }
}

impl UserState {
    /// Apply a patch; returns the sections that could not be merged
    pub fn apply(&mut self, patch: &UserStatePatch) -> Vec<String> {
        let mut rejected = Vec::new();

        merge_into(&mut self.profile, patch.profile.as_ref(), "profile", &mut rejected);
        merge_into(&mut self.preferences, patch.preferences.as_ref(), "preferences", &mut rejected);
        merge_into(&mut self.learning_path, patch.learning_path.as_ref(), "learningPath", &mut rejected);
        merge_into(&mut self.stats, patch.stats.as_ref(), "stats", &mut rejected);
        if let Some(topics) = &patch.topics {
            self.topics = topics.clone();
        }
        rejected
    }

    /// Short description of the learner for the intent prompt
    pub fn prompt_summary(&self) -> String {
        let mut lines = Vec::new();
        if !self.profile.name.is_empty() {
            lines.push(format!("Name: {}", self.profile.name));
        }
        if let Some(age) = self.profile.age {
            lines.push(format!("Age: {}", age));
        }
        if let Some(level) = &self.profile.education_level {
            lines.push(format!("Education level: {}", level));
        }
        if let Some(mood) = &self.profile.mood {
            lines.push(format!("Mood: {}", mood));
        }
        lines.push(format!(
            "Preferences: {} content, {} detail, {} learning style",
            self.preferences.content_type, self.preferences.detail_level, self.preferences.learning_style
        ));
        if !self.topics.is_empty() {
            lines.push(format!("Topics seen: {}", self.topics.join(", ")));
        }
        if self.learning_path.defined {
            let step = self
                .learning_path
                .current_step()
                .map(|s| s.title.as_str())
                .unwrap_or("none");
            lines.push(format!(
                "Learning path: {} (step {} of {}: {})",
                self.learning_path.topic,
                self.learning_path.current_step_index + 1,
                self.learning_path.steps.len(),
                step
            ));
        }
        lines.join("\n")
    }
}

/// Greeting for the start of a session
pub fn welcome_prompt(state: &UserState) -> String {
    let returning = state.stats.sessions_count > 1;
    let name = if state.profile.name.is_empty() {
        "there"
    } else {
        state.profile.name.as_str()
    };
    if returning && state.learning_path.defined {
        let step = state
            .learning_path
            .current_step()
            .map(|s| format!("\"{}\"", s.title))
            .unwrap_or_else(|| "your learning path".into());
        format!(
            "Hello {}! Good to see you again. We were at step {} on {}. Would you like to continue or explore a new topic?",
            name, step, state.learning_path.topic
        )
    } else if returning {
        format!(
            "Hello {}! Good to see you again. Would you like me to suggest a personalized learning path today?",
            name
        )
    } else {
        "Hello! I am your learning assistant. To help you better, could you tell me your first name, \
         your school level and the topics you are interested in? I can then build a learning path \
         suited to your needs."
            .to_string()
    }
}

// ── Stores ────────────────────────────────────────────────

/// Persistence for one user's state
///
/// Implementors provide `load` and `update`. `update` runs the whole
/// read-modify-write under one lock, so concurrent operations never lose
/// each other's changes. Every other operation is built on it.
pub trait UserStateStore: Send + Sync {
    fn load(&self) -> Result<UserState>;

    /// Mutate the state atomically and persist it, returning the new state
    fn update(&self, f: &mut dyn FnMut(&mut UserState)) -> Result<UserState>;

    fn get(&self) -> Result<UserState> {
        self.load()
    }

    /// Merge a patch and persist the result
    fn set(&self, patch: &UserStatePatch) -> Result<UserState> {
        self.update(&mut |state| {
            state.apply(patch);
        })
    }

    fn init_session(&self) -> Result<UserState> {
        self.update(&mut |state| {
            state.stats.sessions_count += 1;
            state.stats.last_session_date = Some(Utc::now().to_rfc3339());
        })
    }

    fn record_interaction(&self) -> Result<UserState> {
        self.update(&mut |state| state.stats.total_interactions += 1)
    }

    fn create_learning_path(&self, topic: &str, steps: Vec<LearningPathStep>) -> Result<UserState> {
        self.update(&mut |state| {
            state.learning_path = LearningPath {
                defined: true,
                current_step_index: 0,
                topic: topic.to_string(),
                steps: steps.clone(),
            };
        })
    }

    /// Complete the current step and move on, staying on the last one
    fn advance_to_next_step(&self) -> Result<UserState> {
        self.update(&mut |state| {
            let path = &mut state.learning_path;
            if !path.defined || path.steps.is_empty() {
                return;
            }
            if let Some(step) = path.steps.get_mut(path.current_step_index) {
                step.completed = true;
            }
            path.current_step_index = (path.current_step_index + 1).min(path.steps.len() - 1);
        })
    }

    fn reset_learning_path(&self) -> Result<UserState> {
        self.update(&mut |state| state.learning_path = LearningPath::default())
    }
}

fn poisoned() -> Error {
    Error::StorageError("user state lock poisoned".into())
}

#[derive(Default)]
pub struct MemoryUserStateStore {
    state: RwLock<UserState>,
}

impl MemoryUserStateStore {
    pub fn new(state: UserState) -> Self {
        MemoryUserStateStore {
            state: RwLock::new(state),
        }
    }
}

impl UserStateStore for MemoryUserStateStore {
    fn load(&self) -> Result<UserState> {
        self.state.read().map(|s| s.clone()).map_err(|_| poisoned())
    }

    fn update(&self, f: &mut dyn FnMut(&mut UserState)) -> Result<UserState> {
        let mut guard = self.state.write().map_err(|_| poisoned())?;
        f(&mut *guard);
        Ok(guard.clone())
    }
}

/// JSON file store; a missing or corrupt file reads as the default state
///
/// Calls block on file I/O. Async callers run them on the blocking pool.
pub struct FileUserStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileUserStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileUserStateStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_state(&self) -> Result<UserState> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UserState::default()),
            Err(e) => return Err(Error::StorageError(format!("{}: {}", self.path.display(), e))),
        };
        match serde_json::from_str(&text) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt user state, using defaults");
                Ok(UserState::default())
            }
        }
    }

    fn write_state(&self, state: &UserState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StorageError(format!("{}: {}", parent.display(), e)))?;
        }
        let text = serde_json::to_string_pretty(state)
            .map_err(|e| Error::StorageError(e.to_string()))?;
        std::fs::write(&self.path, text)
            .map_err(|e| Error::StorageError(format!("{}: {}", self.path.display(), e)))
    }
}

impl UserStateStore for FileUserStateStore {
    fn load(&self) -> Result<UserState> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        self.read_state()
    }

    fn update(&self, f: &mut dyn FnMut(&mut UserState)) -> Result<UserState> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut state = self.read_state()?;
        f(&mut state);
        self.write_state(&state)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        value.as_object().cloned().unwrap()
    }

    fn step(title: &str) -> LearningPathStep {
        LearningPathStep {
            title: title.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let state = UserState::default();
        assert_eq!(state.profile.name, "");
        assert!(state.preferences.examples && state.preferences.quizzes);
        assert!(!state.learning_path.defined);
        assert_eq!(state.stats.sessions_count, 0);
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(UserState::default()).unwrap();
        assert!(value.get("learningPath").is_some());
        assert!(value["stats"].get("sessionsCount").is_some());
        assert!(value["preferences"].get("contentType").is_some());
    }

    #[test]
    fn test_patch_deep_merges_sections() {
        let mut state = UserState::default();
        state.profile.name = "Sam".into();
        state.topics = vec!["algebra".into()];

        let (patch, rejected) = UserStatePatch::from_props(&props(json!({
            "profile": {"mood": "curious"},
            "topics": ["fractions"],
            "somethingElse": 1
        })));
        assert!(rejected.is_empty());
        assert!(state.apply(&patch).is_empty());

        assert_eq!(state.profile.name, "Sam");
        assert_eq!(state.profile.mood.as_deref(), Some("curious"));
        assert_eq!(state.topics, vec!["fractions"]);
    }

    #[test]
    fn test_learning_path_steps_kept_unless_given() {
        let mut state = UserState::default();
        state.learning_path.steps = vec![step("one"), step("two")];

        let (patch, _) = UserStatePatch::from_props(&props(json!({"learningPath": {"topic": "fractions"}})));
        state.apply(&patch);
        assert_eq!(state.learning_path.topic, "fractions");
        assert_eq!(state.learning_path.steps.len(), 2);

        let (patch, _) = UserStatePatch::from_props(&props(json!({"learningPath": {"steps": [{"title": "only"}]}})));
        state.apply(&patch);
        assert_eq!(state.learning_path.steps.len(), 1);
        assert_eq!(state.learning_path.steps[0].title, "only");
    }

    #[test]
    fn test_bad_sections_rejected_individually() {
        let (patch, rejected) = UserStatePatch::from_props(&props(json!({
            "profile": "not an object",
            "topics": {"fractions": true},
            "stats": {"sessionsCount": "many"},
            "preferences": {"quizzes": false}
        })));
        assert_eq!(rejected, vec!["profile", "topics"]);

        let mut state = UserState::default();
        let rejected = state.apply(&patch);
        assert_eq!(rejected, vec!["stats"]);
        assert!(!state.preferences.quizzes);
        assert_eq!(state.stats.sessions_count, 0);
    }

    #[test]
    fn test_session_and_learning_path_operations() {
        let store = MemoryUserStateStore::default();
        let state = store.init_session().unwrap();
        assert_eq!(state.stats.sessions_count, 1);
        assert!(state.stats.last_session_date.is_some());

        // No path defined: advancing is a no-op
        assert_eq!(store.advance_to_next_step().unwrap(), store.get().unwrap());

        store
            .create_learning_path("fractions", vec![step("halves"), step("quarters")])
            .unwrap();
        let state = store.advance_to_next_step().unwrap();
        assert!(state.learning_path.steps[0].completed);
        assert_eq!(state.learning_path.current_step_index, 1);

        let state = store.advance_to_next_step().unwrap();
        assert!(state.learning_path.steps[1].completed);
        assert_eq!(state.learning_path.current_step_index, 1);

        let state = store.reset_learning_path().unwrap();
        assert_eq!(state.learning_path, LearningPath::default());
    }

    #[test]
    fn test_set_persists_patch() {
        let store = MemoryUserStateStore::default();
        let (patch, _) = UserStatePatch::from_props(&props(json!({"profile": {"name": "Lou"}})));
        store.set(&patch).unwrap();
        assert_eq!(store.get().unwrap().profile.name, "Lou");
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store = std::sync::Arc::new(MemoryUserStateStore::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        store.record_interaction().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get().unwrap().stats.total_interactions, 16_000);
    }

    #[test]
    fn test_file_store_concurrent_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileUserStateStore::new(dir.path().join("state.json")));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.record_interaction().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get().unwrap().stats.total_interactions, 100);
    }

    #[test]
    fn test_welcome_prompt_variants() {
        let mut state = UserState::default();
        assert!(welcome_prompt(&state).starts_with("Hello! I am your learning assistant"));

        state.stats.sessions_count = 2;
        state.profile.name = "Sam".into();
        assert!(welcome_prompt(&state).contains("personalized learning path"));

        state.learning_path = LearningPath {
            defined: true,
            current_step_index: 0,
            topic: "fractions".into(),
            steps: vec![step("halves")],
        };
        let prompt = welcome_prompt(&state);
        assert!(prompt.contains("\"halves\""));
        assert!(prompt.contains("fractions"));
    }

    #[test]
    fn test_file_store_roundtrip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = FileUserStateStore::new(&path);

        assert_eq!(store.get().unwrap(), UserState::default());
        store.init_session().unwrap();
        assert_eq!(FileUserStateStore::new(&path).get().unwrap().stats.sessions_count, 1);

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(store.get().unwrap(), UserState::default());
    }

    #[test]
    fn test_prompt_summary_mentions_path() {
        let mut state = UserState::default();
        state.profile.name = "Sam".into();
        state.learning_path = LearningPath {
            defined: true,
            current_step_index: 0,
            topic: "fractions".into(),
            steps: vec![step("halves")],
        };
        let summary = state.prompt_summary();
        assert!(summary.contains("Name: Sam"));
        assert!(summary.contains("Learning path: fractions (step 1 of 1: halves)"));
    }
}
