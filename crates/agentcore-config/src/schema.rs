// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use agentcore_approval::ApprovalPolicy;

fn default_max_iterations() -> u32 {
    200
}

fn default_max_tool_calls() -> u32 {
    1000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_max_retry_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_wall_time() -> Duration {
    Duration::from_secs(1800)
}

/// Top-level configuration: the ambient knobs that govern the agentic loop
/// and tool executor. Model wiring, provider routing, and persona/identity
/// loading are resolved by the embedding application before this config is
/// built, not by this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub loop_config: LoopConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub approval: ApprovalPolicy,
}

/// Agentic loop iteration and wall-time bounds. Duration fields accept
/// human-readable strings (`"5m"`, `"30s"`) rather than bare numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum number of model-request iterations before the loop aborts
    /// with `ErrMaxIterations`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Maximum cumulative tool calls across the run before `ErrMaxToolCalls`.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
    /// Wall-clock budget for the entire run.
    #[serde(default = "default_wall_time", with = "crate::duration_fmt")]
    pub wall_time: Duration,
}

impl LoopConfig {
    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tool_calls: default_max_tool_calls(),
            wall_time: default_wall_time(),
        }
    }
}

/// Executor-wide defaults, overlaid per-tool by [`ToolOverride`]. Duration
/// fields accept human-readable strings (`"5m"`, `"30s"`) rather than bare
/// numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// `0` disables the concurrency bound entirely.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_tool_timeout", with = "crate::duration_fmt")]
    pub timeout: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff", with = "crate::duration_fmt")]
    pub retry_backoff: Duration,
    #[serde(default = "default_max_retry_backoff", with = "crate::duration_fmt")]
    pub max_retry_backoff: Duration,
    /// Per-tool overrides of the defaults above, keyed by tool name.
    #[serde(default)]
    pub overrides: std::collections::HashMap<String, ToolOverride>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout: default_tool_timeout(),
            max_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
            max_retry_backoff: default_max_retry_backoff(),
            overrides: std::collections::HashMap::new(),
        }
    }
}

/// Sparse per-tool override of the executor defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOverride {
    #[serde(default, with = "crate::duration_fmt::option")]
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
    #[serde(default, with = "crate::duration_fmt::option")]
    pub retry_backoff: Option<Duration>,
    #[serde(default, with = "crate::duration_fmt::option")]
    pub max_retry_backoff: Option<Duration>,
    pub priority: Option<i32>,
}

impl ExecutorConfig {
    /// Build the executor's runtime config, overlaying each [`ToolOverride`]
    /// onto this struct's defaults.
    pub fn to_tool_executor_config(&self) -> agentcore_tools::ExecutorConfig {
        let default_call = agentcore_tools::CallConfig {
            timeout: self.timeout,
            max_attempts: self.max_attempts,
            retry_backoff: self.retry_backoff,
            max_retry_backoff: self.max_retry_backoff,
            priority: 0,
        };
        let overrides = self
            .overrides
            .iter()
            .map(|(name, o)| {
                let mut call = default_call;
                if let Some(t) = o.timeout {
                    call.timeout = t;
                }
                if let Some(a) = o.max_attempts {
                    call.max_attempts = a;
                }
                if let Some(b) = o.retry_backoff {
                    call.retry_backoff = b;
                }
                if let Some(b) = o.max_retry_backoff {
                    call.max_retry_backoff = b;
                }
                if let Some(p) = o.priority {
                    call.priority = p;
                }
                (name.clone(), call)
            })
            .collect();
        agentcore_tools::ExecutorConfig { max_concurrency: self.max_concurrency, default_call, overrides }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_executor_and_loop_defaults() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(60));
        let loop_cfg = LoopConfig::default();
        assert_eq!(loop_cfg.wall_time(), Duration::from_secs(1800));
    }

    #[test]
    fn tool_override_merges_humantime_fields_onto_defaults() {
        let mut executor = ExecutorConfig::default();
        executor.overrides.insert(
            "shell".into(),
            ToolOverride { timeout: Some(Duration::from_secs(5)), max_attempts: Some(3), ..Default::default() },
        );
        let tool_cfg = executor.to_tool_executor_config();
        let shell = tool_cfg.overrides.get("shell").unwrap();
        assert_eq!(shell.timeout, Duration::from_secs(5));
        assert_eq!(shell.max_attempts, 3);
        assert_eq!(shell.retry_backoff, Duration::from_millis(200));
    }
}
