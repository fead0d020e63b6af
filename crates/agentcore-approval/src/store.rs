// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::policy::Decision;

/// A persistent record representing a pending tool-call authorization.
///
/// Lifecycle: created in state `pending` with `expires_at = created_at +
/// ttl`; transitions exactly once to `allowed` or `denied`; never
/// resurrects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub agent_id: String,
    pub session_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decision: Decision,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.decision == Decision::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Storage interface consumed by the approval checker to persist pending
/// requests. The concrete persistent backend behind this interface (a
/// database, a file, a remote service) is an external collaborator; this
/// crate provides only the in-memory reference implementation below.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn create(
        &self,
        tool_call_id: &str,
        tool_name: &str,
        input: Value,
        agent_id: &str,
        session_id: &str,
        reason: &str,
        ttl: Duration,
    ) -> anyhow::Result<ApprovalRequest>;

    async fn approve(&self, id: &str, decided_by: &str) -> anyhow::Result<Option<ApprovalRequest>>;

    async fn deny(&self, id: &str, decided_by: &str) -> anyhow::Result<Option<ApprovalRequest>>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<ApprovalRequest>>;

    /// Pending requests that have not yet expired, filtered by `agent_id`
    /// (empty string matches all agents).
    async fn list_pending(&self, agent_id: &str) -> anyhow::Result<Vec<ApprovalRequest>>;

    /// Remove entries created more than `older_than` ago; returns the count removed.
    async fn prune(&self, older_than: Duration) -> anyhow::Result<usize>;
}

/// In-memory [`ApprovalStore`] reference implementation.
#[derive(Default)]
pub struct InMemoryApprovalStore {
    requests: Mutex<HashMap<String, ApprovalRequest>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn decide(&self, id: &str, decided_by: &str, decision: Decision) -> Option<ApprovalRequest> {
        let mut requests = self.requests.lock().unwrap();
        let req = requests.get_mut(id)?;
        // Idempotent: once decided, never resurrects or flips back to pending.
        if !req.is_pending() {
            return Some(req.clone());
        }
        req.decision = decision;
        req.decided_at = Some(Utc::now());
        req.decided_by = Some(decided_by.to_string());
        Some(req.clone())
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn create(
        &self,
        tool_call_id: &str,
        tool_name: &str,
        input: Value,
        agent_id: &str,
        session_id: &str,
        reason: &str,
        ttl: Duration,
    ) -> anyhow::Result<ApprovalRequest> {
        let ttl = if ttl.is_zero() { Duration::from_secs(5 * 60) } else { ttl };
        let now = Utc::now();
        let req = ApprovalRequest {
            id: Uuid::new_v4().to_string(),
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            input,
            agent_id: agent_id.to_string(),
            session_id: session_id.to_string(),
            reason: reason.to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl)?,
            decision: Decision::Pending,
            decided_at: None,
            decided_by: None,
        };
        self.requests.lock().unwrap().insert(req.id.clone(), req.clone());
        Ok(req)
    }

    async fn approve(&self, id: &str, decided_by: &str) -> anyhow::Result<Option<ApprovalRequest>> {
        Ok(self.decide(id, decided_by, Decision::Allowed))
    }

    async fn deny(&self, id: &str, decided_by: &str) -> anyhow::Result<Option<ApprovalRequest>> {
        Ok(self.decide(id, decided_by, Decision::Denied))
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<ApprovalRequest>> {
        Ok(self.requests.lock().unwrap().get(id).cloned())
    }

    async fn list_pending(&self, agent_id: &str) -> anyhow::Result<Vec<ApprovalRequest>> {
        let now = Utc::now();
        let requests = self.requests.lock().unwrap();
        Ok(requests
            .values()
            .filter(|r| r.is_pending() && !r.is_expired(now))
            .filter(|r| agent_id.is_empty() || r.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn prune(&self, older_than: Duration) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than)?;
        let mut requests = self.requests.lock().unwrap();
        let before = requests.len();
        requests.retain(|_, r| r.created_at >= cutoff);
        Ok(before - requests.len())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
