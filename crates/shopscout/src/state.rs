//! Per-session conversation state and the store that owns it.
//!
//! One turn mutates one session's state exactly once, under that session's
//! lock. Handlers never touch the live state: they read an immutable
//! snapshot and return a [`TurnDelta`], which the orchestrator applies
//! atomically on commit. A failed turn leaves the state untouched.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{EntityFilter, Message, Role};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    /// The product ids last shown to the user, in display order. Persists
    /// across turns until a search/recommendation turn overwrites it.
    pub product_ids: Vec<String>,
    /// Last singly-referenced position. Persists until a later successful
    /// resolution overwrites it — even if `product_ids` has since changed
    /// (documented stale-index policy; consumers bounds-check).
    pub product_index: Option<usize>,
    /// Last multiply-referenced positions, same persistence policy.
    pub product_indices: Option<Vec<usize>>,
    /// Last extracted product filter.
    pub entities: Option<EntityFilter>,
}

impl ConversationState {
    /// Snapshot for a turn: a clone with the inbound user message appended,
    /// so handlers see the utterance as the latest message without the live
    /// state having committed anything yet.
    pub fn snapshot_with(&self, user_text: &str) -> ConversationState {
        let mut snapshot = self.clone();
        snapshot.messages.push(Message::user(user_text));
        snapshot
    }

    /// The `window` messages preceding the most recent one — the context a
    /// reference resolver needs to see the last product listing.
    pub fn history_window(&self, window: usize) -> &[Message] {
        if self.messages.is_empty() {
            return &[];
        }
        let end = self.messages.len() - 1;
        let start = end.saturating_sub(window);
        &self.messages[start..end]
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
    }
}

/// Everything a committed turn changes. `None` fields leave the prior value
/// in place; the assistant message is always appended.
#[derive(Debug, Clone, Default)]
pub struct TurnDelta {
    pub assistant_text: String,
    pub product_ids: Option<Vec<String>>,
    pub product_index: Option<usize>,
    pub product_indices: Option<Vec<usize>>,
    pub entities: Option<EntityFilter>,
}

impl TurnDelta {
    /// A delta that only replies, carrying no state updates.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            assistant_text: text.into(),
            ..Default::default()
        }
    }

    /// Commit: append the user message, apply updates, append the reply.
    pub fn apply(self, state: &mut ConversationState, user_text: &str) {
        state.messages.push(Message::user(user_text));
        if let Some(ids) = self.product_ids {
            state.product_ids = ids;
        }
        if let Some(index) = self.product_index {
            state.product_index = Some(index);
        }
        if let Some(indices) = self.product_indices {
            state.product_indices = Some(indices);
        }
        if let Some(entities) = self.entities {
            state.entities = Some(entities);
        }
        state.messages.push(Message::assistant(self.assistant_text));
    }
}

/// Session-keyed state store. Each session owns a `tokio::sync::Mutex` so
/// two concurrent turns on the same session serialize (the second waits and
/// observes the first's committed state); different sessions run fully in
/// parallel.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<ConversationState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the lock handle for a session token.
    pub fn session(&self, session_id: &str) -> Arc<Mutex<ConversationState>> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Mint a fresh session token.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), Arc::default());
        id
    }

    /// Drop a session's state entirely (caller-initiated reset).
    pub fn clear(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_window_excludes_current_message() {
        let mut state = ConversationState::default();
        for i in 0..6 {
            state.messages.push(Message::user(format!("m{}", i)));
        }
        let window = state.history_window(4);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].text, "m1");
        assert_eq!(window[3].text, "m4");
    }

    #[test]
    fn test_history_window_on_short_history() {
        let mut state = ConversationState::default();
        state.messages.push(Message::user("only"));
        assert!(state.history_window(4).is_empty());
        assert!(ConversationState::default().history_window(4).is_empty());
    }

    #[test]
    fn test_apply_overwrites_only_provided_fields() {
        let mut state = ConversationState {
            product_ids: vec!["old".into()],
            product_index: Some(0),
            ..Default::default()
        };
        TurnDelta {
            assistant_text: "here are products".into(),
            product_ids: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        }
        .apply(&mut state, "find me something");

        assert_eq!(state.product_ids, vec!["a", "b"]);
        // Stale index carried over by policy — not cleared on list change.
        assert_eq!(state.product_index, Some(0));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_snapshot_does_not_mutate_live_state() {
        let state = ConversationState::default();
        let snapshot = state.snapshot_with("hello");
        assert_eq!(snapshot.messages.len(), 1);
        assert!(state.messages.is_empty());
        assert_eq!(snapshot.last_user_text(), Some("hello"));
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::new();
        let a = store.session("a");
        let b = store.session("b");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &store.session("a")));
        store.clear("a");
        assert!(!Arc::ptr_eq(&a, &store.session("a")));
    }
}
