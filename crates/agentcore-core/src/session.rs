// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The in-memory conversation container the loop driver reads and appends
//! to, plus the [`SessionStore`] trait boundary for persisting it. The
//! concrete persistent backend is an external collaborator; this crate
//! ships only an in-memory reference implementation for tests and
//! short-lived embeddings.

use std::collections::HashMap;
use std::sync::RwLock;

use agentcore_model::Message;
use async_trait::async_trait;
use uuid::Uuid;

/// In-memory conversation session: the message list the loop driver reads
/// from and appends to, plus an approximate running token count used for
/// context-budget awareness. Actual compaction/summarization is an external
/// collaborator reachable only through [`crate::loop_driver::ContextPacker`].
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    pub token_count: usize,
    pub max_tokens: usize,
}

impl Session {
    pub fn new(max_tokens: usize) -> Self {
        Self { id: Uuid::new_v4().to_string(), messages: Vec::new(), token_count: 0, max_tokens }
    }

    pub fn with_id(id: impl Into<String>, max_tokens: usize) -> Self {
        Self { id: id.into(), messages: Vec::new(), token_count: 0, max_tokens }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs {
            self.push(m);
        }
    }

    /// Fraction of the context window consumed (0.0-1.0).
    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        (self.token_count as f32) / (self.max_tokens as f32)
    }

    pub fn is_near_limit(&self, threshold: f32) -> bool {
        self.context_fraction() >= threshold
    }

    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(|m| m.approx_tokens()).sum();
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }
}

/// The session persistence boundary consumed by an embedding application.
/// This crate does not implement a durable backend — only the contract the
/// loop driver relies on, plus [`InMemorySessionStore`] for tests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, max_tokens: usize) -> anyhow::Result<Session>;
    async fn load(&self, session_id: &str) -> anyhow::Result<Option<Session>>;
    /// Most recent `limit` messages (or all of them when `limit` is `None`),
    /// oldest first.
    async fn get_history(&self, session_id: &str, limit: Option<usize>) -> anyhow::Result<Vec<Message>>;
    async fn append_message(&self, session_id: &str, message: Message) -> anyhow::Result<()>;
    async fn save(&self, session: &Session) -> anyhow::Result<()>;
    async fn delete(&self, session_id: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, max_tokens: usize) -> anyhow::Result<Session> {
        let session = Session::new(max_tokens);
        self.sessions.write().unwrap().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn load(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        Ok(self.sessions.read().unwrap().get(session_id).cloned())
    }

    async fn get_history(&self, session_id: &str, limit: Option<usize>) -> anyhow::Result<Vec<Message>> {
        let sessions = self.sessions.read().unwrap();
        let Some(session) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        match limit {
            Some(n) if n < session.messages.len() => {
                Ok(session.messages[session.messages.len() - n..].to_vec())
            }
            _ => Ok(session.messages.clone()),
        }
    }

    async fn append_message(&self, session_id: &str, message: Message) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        let session =
            sessions.get_mut(session_id).ok_or_else(|| anyhow::anyhow!("unknown session: {session_id}"))?;
        session.push(message);
        Ok(())
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        self.sessions.write().unwrap().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions.write().unwrap().remove(session_id);
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_unique_id() {
        let a = Session::new(1000);
        let b = Session::new(1000);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn new_session_starts_empty() {
        let s = Session::new(1000);
        assert!(s.messages.is_empty());
        assert_eq!(s.token_count, 0);
    }

    #[test]
    fn push_increments_token_count() {
        let mut s = Session::new(1000);
        s.push(Message::user("12345678"));
        assert_eq!(s.token_count, 2);
    }

    #[test]
    fn push_many_accumulates_tokens() {
        let mut s = Session::new(10_000);
        s.push_many([Message::user("12345678"), Message::assistant("abcd")]);
        assert_eq!(s.token_count, 3);
    }

    #[test]
    fn recalculate_tokens_matches_push_sum() {
        let mut s = Session::new(1000);
        s.push(Message::user("hello world"));
        let after_push = s.token_count;
        s.recalculate_tokens();
        assert_eq!(s.token_count, after_push);
    }

    #[test]
    fn replace_messages_sets_messages_and_recalculates_tokens() {
        let mut s = Session::new(1000);
        s.push(Message::user("first"));
        s.push(Message::assistant("reply"));
        let new_msgs = vec![Message::user("only")];
        s.replace_messages(new_msgs.clone());
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].content, "only");
        assert_eq!(s.token_count, 1);
    }

    #[test]
    fn context_fraction_zero_when_empty() {
        let s = Session::new(1000);
        assert_eq!(s.context_fraction(), 0.0);
    }

    #[test]
    fn context_fraction_at_zero_max_does_not_panic() {
        let s = Session::new(0);
        assert_eq!(s.context_fraction(), 0.0);
    }

    #[test]
    fn is_near_limit_true_when_over_threshold() {
        let mut s = Session::new(4);
        s.push(Message::user("1234567890123"));
        s.push(Message::user("abcd"));
        assert!(s.is_near_limit(0.8));
    }

    #[tokio::test]
    async fn in_memory_store_roundtrips_history() {
        let store = InMemorySessionStore::new();
        let session = store.create(1000).await.unwrap();
        store.append_message(&session.id, Message::user("hi")).await.unwrap();
        store.append_message(&session.id, Message::assistant("hello")).await.unwrap();
        let history = store.get_history(&session.id, None).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn in_memory_store_limit_returns_most_recent() {
        let store = InMemorySessionStore::new();
        let session = store.create(1000).await.unwrap();
        for i in 0..5 {
            store.append_message(&session.id, Message::user(format!("m{i}"))).await.unwrap();
        }
        let history = store.get_history(&session.id, Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m3");
        assert_eq!(history[1].content, "m4");
    }

    #[tokio::test]
    async fn in_memory_store_delete_removes_session() {
        let store = InMemorySessionStore::new();
        let session = store.create(1000).await.unwrap();
        store.delete(&session.id).await.unwrap();
        assert!(store.load(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_to_unknown_session_errors() {
        let store = InMemorySessionStore::new();
        let result = store.append_message("nope", Message::user("hi")).await;
        assert!(result.is_err());
    }
}
