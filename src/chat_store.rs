//! Per-user chat history persisted as one JSON document.
//!
//! ```json
//! { "store": { "alice": [ { "role": "user", "content": "..." } ] } }
//! ```
//!
//! [`ChatStore`] is an in-memory snapshot; [`ChatStore::load`] reads it and
//! [`ChatStore::persist`] writes it back. A missing, empty or unparsable file
//! loads as an empty store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::models::ChatMessage;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatStore {
    #[serde(default)]
    store: BTreeMap<String, Vec<ChatMessage>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) if !c.trim().is_empty() => c,
            _ => return Self::new(),
        };
        match serde_json::from_str(&content) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "chat history unreadable, starting empty");
                Self::new()
            }
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write chat history: {}", path.display()))?;
        Ok(())
    }

    pub fn get_messages(&self, key: &str) -> &[ChatMessage] {
        self.store.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_message(&mut self, key: &str, message: ChatMessage) {
        self.store.entry(key.to_string()).or_default().push(message);
    }

    /// Remove every message for `key`. Returns the removed messages.
    pub fn delete_messages(&mut self, key: &str) -> Vec<ChatMessage> {
        self.store.remove(key).unwrap_or_default()
    }
}

/// Load, mutate and persist in one step.
pub fn update<F>(path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&mut ChatStore),
{
    let mut store = ChatStore::load(path);
    f(&mut store);
    store.persist(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;
    use tempfile::TempDir;

    #[test]
    fn append_and_reload_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache/chat_history.json");

        update(&path, |s| {
            s.add_message("alice", ChatMessage::user("xin chào"));
            s.add_message("alice", ChatMessage::assistant("chào bạn"));
            s.add_message("bob", ChatMessage::user("hi"));
        })
        .unwrap();

        let store = ChatStore::load(&path);
        let alice = store.get_messages("alice");
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].role, ChatRole::User);
        assert_eq!(alice[1].content, "chào bạn");
        assert_eq!(store.get_messages("bob").len(), 1);
    }

    #[test]
    fn delete_only_affects_one_user() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.json");
        update(&path, |s| {
            s.add_message("alice", ChatMessage::user("a"));
            s.add_message("bob", ChatMessage::user("b"));
        })
        .unwrap();
        update(&path, |s| {
            s.delete_messages("alice");
        })
        .unwrap();

        let store = ChatStore::load(&path);
        assert!(store.get_messages("alice").is_empty());
        assert_eq!(store.get_messages("bob").len(), 1);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(ChatStore::load(&path), ChatStore::new());
        std::fs::write(&path, "").unwrap();
        assert_eq!(ChatStore::load(&path), ChatStore::new());
    }

    #[test]
    fn unknown_user_has_no_history() {
        assert!(ChatStore::new().get_messages("nobody").is_empty());
    }
}
