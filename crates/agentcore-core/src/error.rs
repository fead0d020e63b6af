// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Terminal errors raised by the agentic loop driver itself, as distinct
//! from tool failures (which are fed back to the model as `ToolResult`s and
//! never abort the run).

use std::fmt;

/// The phase the driver was in when a [`LoopError`] was raised. Mirrors
/// [`crate::loop_driver::Phase`] minus the two terminal variants, since an
/// error can only originate while the loop is still doing something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Init,
    Stream,
    ExecuteTools,
    Continue,
    Complete,
}

/// The named class of a loop error, used by callers to branch on cause
/// without string matching `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopErrorKind {
    MaxIterations,
    MaxToolCalls,
    ContextCancelled,
    NoProvider,
    ToolNotFound,
    ToolTimeout,
    ToolPanic,
    Backpressure,
    Other,
}

/// A terminal error that aborts a run.
#[derive(Debug)]
pub struct LoopError {
    pub kind: LoopErrorKind,
    pub phase: LoopPhase,
    pub iteration: u32,
    pub message: String,
    pub cause: Option<anyhow::Error>,
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop error in {:?} at iteration {}: {}", self.phase, self.iteration, self.message)
    }
}

impl std::error::Error for LoopError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl LoopError {
    pub fn new(kind: LoopErrorKind, phase: LoopPhase, iteration: u32, message: impl Into<String>) -> Self {
        Self { kind, phase, iteration, message: message.into(), cause: None }
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn max_iterations(iteration: u32, limit: u32) -> Self {
        Self::new(
            LoopErrorKind::MaxIterations,
            LoopPhase::Continue,
            iteration,
            format!("exceeded max_iterations ({limit})"),
        )
    }

    pub fn max_tool_calls(iteration: u32, count: u32, limit: u32) -> Self {
        Self::new(
            LoopErrorKind::MaxToolCalls,
            LoopPhase::ExecuteTools,
            iteration,
            format!("exceeded max_tool_calls ({count} > {limit})"),
        )
    }

    pub fn context_cancelled(phase: LoopPhase, iteration: u32) -> Self {
        Self::new(LoopErrorKind::ContextCancelled, phase, iteration, "run was cancelled")
    }

    pub fn no_provider(iteration: u32) -> Self {
        Self::new(LoopErrorKind::NoProvider, LoopPhase::Init, iteration, "no model provider configured")
    }

    pub fn tool_not_found(iteration: u32, tool: &str) -> Self {
        Self::new(LoopErrorKind::ToolNotFound, LoopPhase::ExecuteTools, iteration, format!("tool not found: {tool}"))
    }

    pub fn tool_timeout(iteration: u32, tool: &str) -> Self {
        Self::new(LoopErrorKind::ToolTimeout, LoopPhase::ExecuteTools, iteration, format!("tool timed out: {tool}"))
    }

    pub fn tool_panic(iteration: u32, tool: &str) -> Self {
        Self::new(LoopErrorKind::ToolPanic, LoopPhase::ExecuteTools, iteration, format!("tool panicked: {tool}"))
    }

    pub fn backpressure(phase: LoopPhase, iteration: u32) -> Self {
        Self::new(LoopErrorKind::Backpressure, phase, iteration, "output channel backpressure exceeded")
    }

    pub fn stream_failed(iteration: u32, cause: anyhow::Error) -> Self {
        Self::new(LoopErrorKind::Other, LoopPhase::Stream, iteration, "model completion failed").with_cause(cause)
    }

    pub fn wall_time_exceeded(iteration: u32) -> Self {
        Self::new(LoopErrorKind::Other, LoopPhase::Continue, iteration, "wall-clock run budget exceeded")
    }

    pub fn session_store_failed(iteration: u32, cause: anyhow::Error) -> Self {
        Self::new(LoopErrorKind::Other, LoopPhase::Init, iteration, "session store operation failed").with_cause(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_iterations_carries_kind_and_phase() {
        let e = LoopError::max_iterations(12, 10);
        assert_eq!(e.kind, LoopErrorKind::MaxIterations);
        assert_eq!(e.phase, LoopPhase::Continue);
        assert_eq!(e.iteration, 12);
        assert!(e.message.contains("10"));
    }

    #[test]
    fn display_includes_phase_iteration_and_message() {
        let e = LoopError::tool_not_found(3, "shell");
        let text = format!("{e}");
        assert!(text.contains("ExecuteTools"));
        assert!(text.contains('3'));
        assert!(text.contains("shell"));
    }

    #[test]
    fn with_cause_is_reachable_via_error_source() {
        let cause = anyhow::anyhow!("connection reset");
        let e = LoopError::stream_failed(0, cause);
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn cancellation_helper_sets_expected_kind() {
        let e = LoopError::context_cancelled(LoopPhase::Stream, 1);
        assert_eq!(e.kind, LoopErrorKind::ContextCancelled);
    }
}
