//! Documentation retrieval used to enrich intent prompts
//!
//! `DocumentIndex` is an explicitly constructed service: callers create it,
//! `init` it with documents, and pass it by reference to the pipeline.
//! Markdown is split into one chunk per `###` component heading (falling
//! back to `##` sections) and ranked by term overlap with the query.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// A source document before splitting
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source: String,
    pub content: String,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Document {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// One retrievable chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub id: String,
    pub content: String,
    pub source: String,
    /// Heading hierarchy: `mainTitle`, `section`, `component`
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexState {
    pub is_indexed: bool,
    pub last_indexed: Option<DateTime<Utc>>,
    pub document_count: usize,
}

/// Anything that can answer `search(query, k)`
#[async_trait]
pub trait ContextSearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>>;
}

/// Search, degrading any failure to an empty context
pub async fn enrich_context(search: &dyn ContextSearch, query: &str, k: usize) -> Vec<ContextChunk> {
    match search.search(query, k).await {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(error = %e, "retrieval failed, continuing without context");
            Vec::new()
        }
    }
}

// ── Markdown splitting ────────────────────────────────────

/// Split markdown before every `### ` heading, or before every `## ` heading
/// when that yields at most one chunk
pub fn split_markdown(text: &str) -> Vec<String> {
    let chunks = split_before(text, "### ");
    if chunks.len() <= 1 {
        split_before(text, "## ")
    } else {
        chunks
    }
}

fn split_before(text: &str, marker: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if line.starts_with(marker) && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// First `#`, `##` and `###` headings of a chunk
pub fn extract_hierarchy(chunk: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for (prefix, key) in [("# ", "mainTitle"), ("## ", "section"), ("### ", "component")] {
        if let Some(title) = chunk.lines().find_map(|line| line.strip_prefix(prefix)) {
            metadata.insert(key.to_string(), title.trim().to_string());
        }
    }
    metadata
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

// ── Index ─────────────────────────────────────────────────

#[derive(Default)]
struct IndexInner {
    state: IndexState,
    chunks: Vec<(ContextChunk, BTreeSet<String>)>,
}

#[derive(Default)]
pub struct DocumentIndex {
    inner: RwLock<IndexInner>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the index contents with the chunks of `documents`
    pub fn init(&self, documents: &[Document]) -> Result<usize> {
        let mut chunks = Vec::new();
        for doc in documents {
            for piece in split_markdown(&doc.content) {
                let mut metadata = extract_hierarchy(&piece);
                metadata.insert("type".into(), "markdown".into());
                let mut searchable = terms(&piece);
                searchable.extend(metadata.values().flat_map(|v| terms(v)));
                let chunk = ContextChunk {
                    id: format!("chunk-{}", chunks.len()),
                    content: piece,
                    source: doc.source.clone(),
                    metadata,
                };
                chunks.push((chunk, searchable));
            }
        }

        let count = chunks.len();
        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::StorageError("document index lock poisoned".into()))?;
        inner.chunks = chunks;
        inner.state = IndexState {
            is_indexed: true,
            last_indexed: Some(Utc::now()),
            document_count: count,
        };
        info!(chunks = count, documents = documents.len(), "documents indexed");
        Ok(count)
    }

    /// Load every `.md` file of a directory (sorted by name) and index it
    pub fn init_from_dir(&self, dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::StorageError(format!("{}: {}", dir.display(), e)))?;
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::StorageError(format!("{}: {}", path.display(), e)))?;
            documents.push(Document::new(path.display().to_string(), content));
        }
        self.init(&documents)
    }

    /// Drop every chunk and mark the index as not indexed
    pub fn reset(&self) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = IndexInner::default();
        }
    }

    pub fn state(&self) -> IndexState {
        self.inner
            .read()
            .map(|inner| inner.state.clone())
            .unwrap_or_default()
    }

    pub fn chunks(&self) -> Vec<ContextChunk> {
        self.inner
            .read()
            .map(|inner| inner.chunks.iter().map(|(c, _)| c.clone()).collect())
            .unwrap_or_default()
    }

    fn ranked(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| Error::upstream("retrieval", "document index lock poisoned"))?;
        if !inner.state.is_indexed {
            return Err(Error::upstream("retrieval", "documents are not indexed"));
        }

        let query_terms = terms(query);
        let mut scored: Vec<(usize, usize)> = inner
            .chunks
            .iter()
            .enumerate()
            .map(|(i, (_, chunk_terms))| (query_terms.intersection(chunk_terms).count(), i))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Highest score first; ties keep document order
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, i)| inner.chunks[i].0.clone())
            .collect())
    }
}

#[async_trait]
impl ContextSearch for DocumentIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        self.ranked(query, k)
    }
}
