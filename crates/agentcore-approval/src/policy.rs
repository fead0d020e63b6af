// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pattern::matches_any;

/// The outcome of evaluating a tool call against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allowed,
    Denied,
    Pending,
}

fn default_true() -> bool {
    true
}

fn default_decision() -> DefaultDecision {
    DefaultDecision::Pending
}

fn default_request_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_safe_bins() -> Vec<String> {
    ["cat", "head", "tail", "wc", "sort", "uniq", "grep"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// The configured `default_decision` value. Distinct from [`Decision`]
/// because the config format never persists `Pending` as the literal
/// resolved answer without the ask-fallback rule being applied first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDecision {
    Allowed,
    Denied,
    Pending,
}

impl From<DefaultDecision> for Decision {
    fn from(d: DefaultDecision) -> Self {
        match d {
            DefaultDecision::Allowed => Decision::Allowed,
            DefaultDecision::Denied => Decision::Denied,
            DefaultDecision::Pending => Decision::Pending,
        }
    }
}

/// Policy configuration governing whether a tool call is allowed, denied, or
/// requires user approval.
///
/// Precedence when evaluating a tool name is strictly top-down: denylist,
/// allowlist, skill-registered tools (if `skill_allowlist`), safe-bins,
/// require-approval, then `default_decision`. The first matching rank wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalPolicy {
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    pub require_approval: Vec<String>,
    #[serde(default = "default_safe_bins")]
    pub safe_bins: Vec<String>,
    #[serde(default = "default_true")]
    pub skill_allowlist: bool,
    #[serde(default = "default_true")]
    pub ask_fallback: bool,
    #[serde(default = "default_decision")]
    pub default_decision: DefaultDecision,
    #[serde(default = "default_request_ttl", with = "humantime_duration")]
    pub request_ttl: Duration,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            denylist: Vec::new(),
            require_approval: Vec::new(),
            safe_bins: default_safe_bins(),
            skill_allowlist: true,
            ask_fallback: true,
            default_decision: DefaultDecision::Pending,
            request_ttl: default_request_ttl(),
        }
    }
}

impl ApprovalPolicy {
    /// Evaluate `tool_name` against this policy, consulting `skill_tools`
    /// for rank 3 when `skill_allowlist` is enabled. Returns the decision
    /// and a short human-readable reason for the match.
    pub fn decide(&self, tool_name: &str, skill_tools: &[String]) -> (Decision, String) {
        if matches_any(&self.denylist, tool_name) {
            return (Decision::Denied, "matched denylist".into());
        }
        if matches_any(&self.allowlist, tool_name) {
            return (Decision::Allowed, "matched allowlist".into());
        }
        if self.skill_allowlist && matches_any(skill_tools, tool_name) {
            return (Decision::Allowed, "registered skill tool".into());
        }
        if matches_any(&self.safe_bins, tool_name) {
            return (Decision::Allowed, "matched safe-bins".into());
        }
        if matches_any(&self.require_approval, tool_name) {
            return (Decision::Pending, "matched require_approval".into());
        }
        (self.default_decision.into(), "default decision".into())
    }

    /// Merge caller-supplied overrides onto this policy (the default).
    ///
    /// List fields replace the default wholesale when the override
    /// explicitly sets a non-empty list — never additive, which would
    /// silently broaden an allowlist. Scalar fields always take the
    /// override's value.
    pub fn merge_override(&self, overrides: &ApprovalPolicyOverride) -> ApprovalPolicy {
        let mut merged = self.clone();
        if let Some(list) = &overrides.allowlist {
            if !list.is_empty() {
                merged.allowlist = list.clone();
            }
        }
        if let Some(list) = &overrides.denylist {
            if !list.is_empty() {
                merged.denylist = list.clone();
            }
        }
        if let Some(list) = &overrides.require_approval {
            if !list.is_empty() {
                merged.require_approval = list.clone();
            }
        }
        if let Some(list) = &overrides.safe_bins {
            if !list.is_empty() {
                merged.safe_bins = list.clone();
            }
        }
        if let Some(v) = overrides.skill_allowlist {
            merged.skill_allowlist = v;
        }
        if let Some(v) = overrides.ask_fallback {
            merged.ask_fallback = v;
        }
        if let Some(v) = overrides.default_decision {
            merged.default_decision = v;
        }
        if let Some(v) = overrides.request_ttl {
            merged.request_ttl = v;
        }
        merged
    }
}

/// Sparse per-agent override applied on top of the default policy via
/// [`ApprovalPolicy::merge_override`].
#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicyOverride {
    pub allowlist: Option<Vec<String>>,
    pub denylist: Option<Vec<String>>,
    pub require_approval: Option<Vec<String>>,
    pub safe_bins: Option<Vec<String>>,
    pub skill_allowlist: Option<bool>,
    pub ask_fallback: Option<bool>,
    pub default_decision: Option<DefaultDecision>,
    pub request_ttl: Option<Duration>,
}

/// Serializes `request_ttl` as a human-readable duration string (`"5m"`)
/// rather than a bare integer, matching every other duration field in the
/// workspace's config surface.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
