//! Bounded conversation history

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, Role};

pub const DEFAULT_HISTORY_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        HistoryEntry {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ring of the most recent messages; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_HISTORY_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        ConversationMemory {
            entries: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.max_size == 0 {
            return;
        }
        while self.entries.len() >= self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(HistoryEntry::new(Role::User, content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(HistoryEntry::new(Role::Assistant, content));
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// History as chat messages, oldest first
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .map(|e| ChatMessage {
                role: e.role,
                content: e.content.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}
