// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::policy::{ApprovalPolicy, ApprovalPolicyOverride, Decision};
use crate::store::ApprovalStore;

/// A callback asked whether an interactive approval UI is currently
/// reachable. When absent, or when it returns `false`, a `pending`
/// resolution with `ask_fallback = false` is downgraded to `denied`.
pub type UiAvailability = Arc<dyn Fn() -> bool + Send + Sync>;

/// Evaluates tool calls against a default policy and any per-agent
/// overrides, consulting an [`ApprovalStore`] when a decision resolves to
/// `pending`.
pub struct ApprovalChecker {
    default_policy: RwLock<ApprovalPolicy>,
    per_agent: RwLock<HashMap<String, ApprovalPolicy>>,
    skill_tools: RwLock<HashSet<String>>,
    store: Arc<dyn ApprovalStore>,
    ui_available: Option<UiAvailability>,
}

impl ApprovalChecker {
    pub fn new(default_policy: ApprovalPolicy, store: Arc<dyn ApprovalStore>) -> Self {
        Self {
            default_policy: RwLock::new(default_policy),
            per_agent: RwLock::new(HashMap::new()),
            skill_tools: RwLock::new(HashSet::new()),
            store,
            ui_available: None,
        }
    }

    pub fn with_ui_availability(mut self, cb: UiAvailability) -> Self {
        self.ui_available = Some(cb);
        self
    }

    /// Install a per-agent policy override, consulted in preference to the
    /// default for that agent id. Unknown agents use the default. The
    /// override is merged onto the current default policy via
    /// [`ApprovalPolicy::merge_override`]: non-empty list fields replace the
    /// default wholesale, scalar fields take the override's value, and
    /// unset fields fall back to the default.
    pub async fn set_agent_policy(&self, agent_id: impl Into<String>, overrides: ApprovalPolicyOverride) {
        let agent_id = agent_id.into();
        let merged = self.default_policy.read().await.merge_override(&overrides);
        tracing::info!(agent_id = %agent_id, "installed per-agent approval policy override");
        self.per_agent.write().await.insert(agent_id, merged);
    }

    /// Register a tool name as belonging to an externally loaded skill,
    /// making it eligible for rank-3 auto-allow when `skill_allowlist` is set.
    pub async fn register_skill_tool(&self, tool_name: impl Into<String>) {
        self.skill_tools.write().await.insert(tool_name.into());
    }

    async fn resolve_policy(&self, agent_id: &str) -> ApprovalPolicy {
        if let Some(p) = self.per_agent.read().await.get(agent_id) {
            return p.clone();
        }
        self.default_policy.read().await.clone()
    }

    fn ui_available(&self) -> bool {
        self.ui_available.as_ref().map(|cb| cb()).unwrap_or(false)
    }

    /// Evaluate a tool call, creating a persisted approval request and
    /// returning `pending` only when one was actually created (the caller
    /// must synthesize a non-retryable error result on `pending` rather than
    /// block, per the loop driver's contract).
    pub async fn check(
        &self,
        agent_id: &str,
        session_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> anyhow::Result<(Decision, String)> {
        let policy = self.resolve_policy(agent_id).await;
        let skill_tools: Vec<String> = self.skill_tools.read().await.iter().cloned().collect();
        let (decision, reason) = policy.decide(tool_name, &skill_tools);

        if decision != Decision::Pending {
            tracing::info!(agent_id, tool_name, decision = ?decision, %reason, "approval decision");
            return Ok((decision, reason));
        }

        if !self.ui_available() && !policy.ask_fallback {
            tracing::info!(agent_id, tool_name, "approval downgraded to denied: no UI available");
            return Ok((Decision::Denied, "approval unavailable".to_string()));
        }

        self.store
            .create(tool_call_id, tool_name, input, agent_id, session_id, &reason, policy.request_ttl)
            .await?;
        tracing::info!(agent_id, tool_name, tool_call_id, "approval request created, pending");
        Ok((Decision::Pending, reason))
    }

    pub fn store(&self) -> &Arc<dyn ApprovalStore> {
        &self.store
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryApprovalStore;

    fn checker_with(policy: ApprovalPolicy, ui_available: bool) -> ApprovalChecker {
        let store = Arc::new(InMemoryApprovalStore::new());
        let c = ApprovalChecker::new(policy, store);
        c.with_ui_availability(Arc::new(move || ui_available))
    }

    #[tokio::test]
    async fn allowed_decision_never_touches_store() {
        let policy = ApprovalPolicy { allowlist: vec!["list_*".into()], ..ApprovalPolicy::default() };
        let c = checker_with(policy, true);
        let (d, _) = c.check("agent", "sess", "call-1", "list_files", serde_json::json!({})).await.unwrap();
        assert_eq!(d, Decision::Allowed);
        assert!(c.store().list_pending("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_with_ui_available_creates_request() {
        let policy = ApprovalPolicy {
            require_approval: vec!["dangerous".into()],
            safe_bins: vec![],
            ..ApprovalPolicy::default()
        };
        let c = checker_with(policy, true);
        let (d, _) = c.check("agent-1", "sess", "call-1", "dangerous", serde_json::json!({})).await.unwrap();
        assert_eq!(d, Decision::Pending);
        let pending = c.store().list_pending("agent-1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tool_call_id, "call-1");
    }

    #[tokio::test]
    async fn pending_without_ui_but_ask_fallback_true_stays_pending() {
        let policy = ApprovalPolicy {
            require_approval: vec!["dangerous".into()],
            safe_bins: vec![],
            ..ApprovalPolicy::default()
        };
        let c = checker_with(policy, false);
        let (d, _) = c.check("agent-1", "sess", "call-1", "dangerous", serde_json::json!({})).await.unwrap();
        assert_eq!(d, Decision::Pending);
        assert_eq!(c.store().list_pending("agent-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_without_ui_and_ask_fallback_false_downgrades_to_denied() {
        let policy = ApprovalPolicy {
            require_approval: vec!["dangerous".into()],
            safe_bins: vec![],
            ask_fallback: false,
            ..ApprovalPolicy::default()
        };
        let c = checker_with(policy, false);
        let (d, reason) = c.check("agent-1", "sess", "call-1", "dangerous", serde_json::json!({})).await.unwrap();
        assert_eq!(d, Decision::Denied);
        assert_eq!(reason, "approval unavailable");
        assert!(c.store().list_pending("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_with_ask_fallback_false_but_ui_available_stays_pending() {
        let policy = ApprovalPolicy {
            require_approval: vec!["dangerous".into()],
            safe_bins: vec![],
            ask_fallback: false,
            ..ApprovalPolicy::default()
        };
        let c = checker_with(policy, true);
        let (d, _) = c.check("agent-1", "sess", "call-1", "dangerous", serde_json::json!({})).await.unwrap();
        assert_eq!(d, Decision::Pending);
    }

    #[tokio::test]
    async fn per_agent_override_takes_precedence_over_default() {
        let default = ApprovalPolicy { safe_bins: vec![], ..ApprovalPolicy::default() };
        let c = checker_with(default, true);
        c.set_agent_policy(
            "agent-1",
            ApprovalPolicyOverride { allowlist: Some(vec!["x".into()]), ..Default::default() },
        )
        .await;

        let (d1, _) = c.check("agent-1", "sess", "c1", "x", serde_json::json!({})).await.unwrap();
        assert_eq!(d1, Decision::Allowed);

        // A different, unconfigured agent still uses the default policy (pending).
        let (d2, _) = c.check("agent-2", "sess", "c2", "x", serde_json::json!({})).await.unwrap();
        assert_eq!(d2, Decision::Pending);
    }

    #[tokio::test]
    async fn per_agent_override_merges_onto_default_not_replaces_it() {
        let default = ApprovalPolicy { denylist: vec!["rm -rf *".into()], ..ApprovalPolicy::default() };
        let c = checker_with(default, true);
        // Override only ask_fallback; denylist/safe_bins should survive from the default.
        c.set_agent_policy("agent-1", ApprovalPolicyOverride { ask_fallback: Some(false), ..Default::default() })
            .await;

        let (d1, _) = c.check("agent-1", "sess", "c1", "rm -rf *", serde_json::json!({})).await.unwrap();
        assert_eq!(d1, Decision::Denied, "denylist inherited from default survives the merge");
        let (d2, _) = c.check("agent-1", "sess", "c2", "cat", serde_json::json!({})).await.unwrap();
        assert_eq!(d2, Decision::Allowed, "safe_bins inherited from default survives the merge");
    }

    #[tokio::test]
    async fn registered_skill_tool_is_auto_allowed() {
        let policy = ApprovalPolicy { safe_bins: vec![], ..ApprovalPolicy::default() };
        let c = checker_with(policy, true);
        c.register_skill_tool("my_skill").await;
        let (d, _) = c.check("agent", "sess", "c1", "my_skill", serde_json::json!({})).await.unwrap();
        assert_eq!(d, Decision::Allowed);
    }
}
