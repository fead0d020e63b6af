// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Typed run events, fan-out sinks, and the durable JSONL trace format.
//!
//! Shared by the tool executor (which emits `tool.*` events) and the
//! agentic loop driver (which emits everything else), so it lives in its
//! own crate rather than under either.
mod event;
mod redact;
mod sink;
mod trace;

pub use event::{
    AgentEvent, ErrorPayload, EventKind, SequenceCounter, StatsPayload, StreamPayload, ToolPayload,
    TRACE_VERSION,
};
pub use redact::{DefaultRedactor, NoopRedactor, Redactor};
pub use sink::{CallbackSink, ChannelSink, ChunkAdapterSink, MultiSink, NopSink, Sink};
pub use trace::{Replayer, ReplayStats, TraceHeader, TraceReader, TraceWriter};
