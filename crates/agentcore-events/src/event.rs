// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TRACE_VERSION: u32 = 1;

/// A streamed text fragment, used for both model text and thinking deltas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamPayload {
    pub text: String,
}

/// Per-call tool lifecycle payload. `args_json` / `result_json` are the raw
/// JSON text of the call's input and the result's content; the default
/// [`crate::redact::Redactor`] replaces both with a literal placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolPayload {
    pub call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args_json: String,
    #[serde(default)]
    pub result_json: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
}

/// Aggregate counters attached to completion and iteration-boundary events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StatsPayload {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_tokens: u32,
    #[serde(default)]
    pub cache_write_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// The typed sum over every event the agent execution core can emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    IterStarted,
    ModelDelta { stream: StreamPayload },
    ThinkingStart,
    ThinkingDelta { stream: StreamPayload },
    ThinkingEnd,
    ModelCompleted { stats: StatsPayload },
    ToolStarted { tool: ToolPayload },
    ToolFinished { tool: ToolPayload },
    ToolFailed { tool: ToolPayload },
    ToolTimeout { tool: ToolPayload },
    ToolApprovalRequired { tool: ToolPayload },
    IterFinished { stats: StatsPayload },
    ContextPacked { stats: StatsPayload },
    RunError { error: ErrorPayload },
    RunFinished,
}

/// One event in a run's lifecycle, carrying a monotonically increasing
/// per-run sequence number in addition to its typed payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    pub version: u32,
    pub sequence: u64,
    pub run_id: String,
    pub time: DateTime<Utc>,
    pub iter_index: u32,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl AgentEvent {
    pub fn new(run_id: impl Into<String>, sequence: u64, iter_index: u32, kind: EventKind) -> Self {
        Self { version: TRACE_VERSION, sequence, run_id: run_id.into(), time: Utc::now(), iter_index, kind }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            EventKind::RunStarted => "run.started",
            EventKind::IterStarted => "iter.started",
            EventKind::ModelDelta { .. } => "model.delta",
            EventKind::ThinkingStart => "thinking.start",
            EventKind::ThinkingDelta { .. } => "thinking.delta",
            EventKind::ThinkingEnd => "thinking.end",
            EventKind::ModelCompleted { .. } => "model.completed",
            EventKind::ToolStarted { .. } => "tool.started",
            EventKind::ToolFinished { .. } => "tool.finished",
            EventKind::ToolFailed { .. } => "tool.failed",
            EventKind::ToolTimeout { .. } => "tool.timeout",
            EventKind::ToolApprovalRequired { .. } => "tool.approval_required",
            EventKind::IterFinished { .. } => "iter.finished",
            EventKind::ContextPacked { .. } => "context.packed",
            EventKind::RunError { .. } => "run.error",
            EventKind::RunFinished => "run.finished",
        }
    }
}

/// Monotonic per-run sequence allocator. One instance is shared (via `Arc`
/// or plain reference) by the loop driver and the tool executor's
/// concurrently-spawned call tasks for the duration of one run.
#[derive(Debug, Default)]
pub struct SequenceCounter(std::sync::atomic::AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(std::sync::atomic::AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_counter_is_strictly_increasing() {
        let c = SequenceCounter::new();
        let a = c.next();
        let b = c.next();
        let d = c.next();
        assert!(a < b);
        assert!(b < d);
    }

    #[test]
    fn kind_name_matches_spec_tags() {
        let e = AgentEvent::new("r1", 0, 0, EventKind::RunStarted);
        assert_eq!(e.kind_name(), "run.started");
        let e = AgentEvent::new(
            "r1",
            1,
            0,
            EventKind::ToolFinished { tool: ToolPayload { call_id: "c".into(), tool_name: "t".into(), ..Default::default() } },
        );
        assert_eq!(e.kind_name(), "tool.finished");
    }

    #[test]
    fn event_serialises_with_flattened_kind_tag() {
        let e = AgentEvent::new("r1", 0, 0, EventKind::RunStarted);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"type\":\"run_started\""));
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
