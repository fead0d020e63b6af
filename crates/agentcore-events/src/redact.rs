// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::event::{AgentEvent, EventKind};

const REDACTED: &str = "[REDACTED]";

/// Transforms an event's payload before it is persisted to a trace.
pub trait Redactor: Send + Sync {
    fn redact(&self, event: &mut AgentEvent);
}

/// Replaces `tool.args_json` and `tool.result_json` with a literal
/// placeholder on every tool lifecycle event. Applied by [`crate::trace::TraceWriter`]
/// by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRedactor;

impl Redactor for DefaultRedactor {
    fn redact(&self, event: &mut AgentEvent) {
        let tool = match &mut event.kind {
            EventKind::ToolStarted { tool }
            | EventKind::ToolFinished { tool }
            | EventKind::ToolFailed { tool }
            | EventKind::ToolTimeout { tool }
            | EventKind::ToolApprovalRequired { tool } => tool,
            _ => return,
        };
        tool.args_json = REDACTED.to_string();
        tool.result_json = REDACTED.to_string();
    }
}

/// Passes events through unmodified.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRedactor;

impl Redactor for NoopRedactor {
    fn redact(&self, _event: &mut AgentEvent) {}
}
