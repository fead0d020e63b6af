// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agentic loop driver: `init -> stream -> (execute_tools -> stream)* ->
//! complete | error`. Drives one model provider through a conversation,
//! dispatching every tool call the model emits through the approval checker
//! and tool executor, and reporting progress through an [`agentcore_events`]
//! sink.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use agentcore_approval::{ApprovalChecker, Decision};
use agentcore_config::LoopConfig;
use agentcore_events::{
    AgentEvent, ErrorPayload, EventKind, Sink, SequenceCounter, StatsPayload, StreamPayload, ToolPayload,
};
use agentcore_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, ToolCall, ToolResult, Usage};
use agentcore_tools::{ToolExecutor, ToolRegistry};

use crate::error::{LoopError, LoopPhase};
use crate::json_repair;
use crate::session::SessionStore;
use crate::transcript;

/// The driver's state machine position. `Continue` is the brief instant
/// between one iteration's tool results landing and the next stream
/// starting; every other phase corresponds to active work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Stream,
    ExecuteTools,
    Continue,
    Complete,
    Error,
}

/// Snapshot of the driver's progress through a run, returned on success and
/// available to a caller inspecting a failed run's `LoopError` context.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub phase: Phase,
    pub iteration: u32,
    pub tool_call_count: u32,
    pub start_time: Instant,
}

impl LoopState {
    fn new() -> Self {
        Self { phase: Phase::Init, iteration: 0, tool_call_count: 0, start_time: Instant::now() }
    }
}

/// Identifies the run for eventing and session serialization. An empty
/// `session_id` opts the run out of per-session locking.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub agent_id: String,
    pub session_id: String,
}

/// The external context-packing/summarization collaborator. The driver
/// calls this before every model request when one is installed; it never
/// compacts or summarizes on its own.
#[async_trait]
pub trait ContextPacker: Send + Sync {
    async fn pack(&self, messages: Vec<Message>, system: Option<String>) -> anyhow::Result<PackedContext>;
}

pub struct PackedContext {
    pub messages: Vec<Message>,
    pub system: Option<String>,
}

/// A packer that returns its input unchanged. The default when no external
/// packer is installed.
pub struct NoopPacker;

#[async_trait]
impl ContextPacker for NoopPacker {
    async fn pack(&self, messages: Vec<Message>, system: Option<String>) -> anyhow::Result<PackedContext> {
        Ok(PackedContext { messages, system })
    }
}

pub struct LoopDriver {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
    approval: Arc<ApprovalChecker>,
    packer: Arc<dyn ContextPacker>,
    config: LoopConfig,
    session_locks: Arc<crate::session_lock::SessionLockRegistry>,
    session_store: Option<Arc<dyn SessionStore>>,
}

impl LoopDriver {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        executor: Arc<ToolExecutor>,
        approval: Arc<ApprovalChecker>,
        config: LoopConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            executor,
            approval,
            packer: Arc::new(NoopPacker),
            config,
            session_locks: Arc::new(crate::session_lock::SessionLockRegistry::new()),
            session_store: None,
        }
    }

    pub fn with_packer(mut self, packer: Arc<dyn ContextPacker>) -> Self {
        self.packer = packer;
        self
    }

    pub fn with_session_locks(mut self, locks: Arc<crate::session_lock::SessionLockRegistry>) -> Self {
        self.session_locks = locks;
        self
    }

    /// Install a session store. When set, `run` loads history for
    /// `ctx.session_id` into an initially empty `messages` and persists every
    /// message (user, assistant, tool-results) appended during the run. A
    /// run with an empty `session_id`, or no store installed, leaves
    /// `messages` as the caller's sole source of truth.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    async fn persist(&self, ctx: &RunContext, message: &Message) -> Result<(), LoopError> {
        if ctx.session_id.is_empty() {
            return Ok(());
        }
        if let Some(store) = &self.session_store {
            store
                .append_message(&ctx.session_id, message.clone())
                .await
                .map_err(|e| LoopError::session_store_failed(0, e))?;
        }
        Ok(())
    }

    /// Run the loop to completion (or a terminal error), mutating `messages`
    /// in place as the conversation progresses. `sink` receives the full
    /// event sequence: `run.started`, then per-iteration `iter.started`,
    /// `model.delta`/`thinking.*`, `model.completed`, `tool.*`,
    /// `iter.finished`, and finally `run.error` or `run.finished`.
    #[tracing::instrument(skip_all, fields(run_id = %ctx.run_id, agent_id = %ctx.agent_id, session_id = %ctx.session_id))]
    pub async fn run(
        &self,
        ctx: RunContext,
        messages: &mut Vec<Message>,
        system: Option<String>,
        user_message: Message,
        sink: Arc<dyn Sink>,
        cancel: CancellationToken,
    ) -> Result<LoopState, LoopError> {
        let _guard = self.session_locks.acquire(&ctx.session_id).await;
        tracing::info!(run_id = %ctx.run_id, agent_id = %ctx.agent_id, "run started");
        let seq = SequenceCounter::new();
        let mut state = LoopState::new();

        if messages.is_empty() && !ctx.session_id.is_empty() {
            if let Some(store) = &self.session_store {
                let history = store
                    .get_history(&ctx.session_id, None)
                    .await
                    .map_err(|e| LoopError::session_store_failed(0, e))?;
                messages.extend(history);
            }
        }

        messages.push(user_message.clone());
        self.persist(&ctx, &user_message).await?;
        self.emit(&sink, &ctx, &seq, state.iteration, EventKind::RunStarted);

        let result = self.drive(&ctx, messages, system, &sink, &seq, &cancel, &mut state).await;

        match &result {
            Ok(_) => {
                state.phase = Phase::Complete;
                tracing::info!(run_id = %ctx.run_id, iteration = state.iteration, "run finished");
                self.emit(&sink, &ctx, &seq, state.iteration, EventKind::RunFinished);
            }
            Err(err) => {
                state.phase = Phase::Error;
                tracing::info!(run_id = %ctx.run_id, iteration = state.iteration, error = %err, "run errored");
                self.emit(
                    &sink,
                    &ctx,
                    &seq,
                    state.iteration,
                    EventKind::RunError { error: ErrorPayload { message: err.to_string(), phase: Some(format!("{:?}", err.phase)) } },
                );
            }
        }
        result.map(|_| state)
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        messages: &mut Vec<Message>,
        system: Option<String>,
        sink: &Arc<dyn Sink>,
        seq: &SequenceCounter,
        cancel: &CancellationToken,
        state: &mut LoopState,
    ) -> Result<(), LoopError> {
        loop {
            if cancel.is_cancelled() {
                return Err(LoopError::context_cancelled(LoopPhase::Stream, state.iteration));
            }
            if state.start_time.elapsed() > self.config.wall_time() {
                return Err(LoopError::wall_time_exceeded(state.iteration));
            }
            if state.iteration >= self.config.max_iterations {
                return Err(LoopError::max_iterations(state.iteration, self.config.max_iterations));
            }

            state.phase = Phase::Stream;
            tracing::info!(run_id = %ctx.run_id, iteration = state.iteration, "iteration started");
            self.emit(sink, ctx, seq, state.iteration, EventKind::IterStarted);

            let packed = self
                .packer
                .pack(transcript::repair(messages.clone()), system.clone())
                .await
                .map_err(|e| LoopError::stream_failed(state.iteration, e))?;
            if packed.messages.len() != messages.len() {
                let before: usize = messages.iter().map(|m| m.approx_tokens()).sum();
                let after: usize = packed.messages.iter().map(|m| m.approx_tokens()).sum();
                self.emit(
                    sink,
                    ctx,
                    seq,
                    state.iteration,
                    EventKind::ContextPacked {
                        stats: StatsPayload { input_tokens: before as u32, output_tokens: after as u32, ..Default::default() },
                    },
                );
            }

            let tools = if self.provider.supports_tools() { self.tools.schemas() } else { Vec::new() };
            let req = CompletionRequest { system: packed.system, messages: packed.messages, tools, stream: true };

            let (text, tool_calls, usage) =
                self.stream_turn(ctx, req, sink, seq, state.iteration, cancel).await?;

            if !text.is_empty() || !tool_calls.is_empty() {
                let assistant_message = Message::assistant_with_tool_calls(text, tool_calls.clone());
                messages.push(assistant_message.clone());
                self.persist(ctx, &assistant_message).await?;
            }

            self.emit(
                sink,
                ctx,
                seq,
                state.iteration,
                EventKind::ModelCompleted {
                    stats: StatsPayload {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        cache_read_tokens: usage.cache_read_tokens,
                        cache_write_tokens: usage.cache_write_tokens,
                    },
                },
            );

            if tool_calls.is_empty() {
                return Ok(());
            }

            state.phase = Phase::ExecuteTools;
            state.tool_call_count += tool_calls.len() as u32;
            if state.tool_call_count > self.config.max_tool_calls {
                return Err(LoopError::max_tool_calls(state.iteration, state.tool_call_count, self.config.max_tool_calls));
            }

            let results = self.dispatch_tools(ctx, &tool_calls, sink, seq, state.iteration, cancel).await;
            let tool_results_message = Message::tool_results(results);
            messages.push(tool_results_message.clone());
            self.persist(ctx, &tool_results_message).await?;

            state.iteration += 1;
            tracing::info!(run_id = %ctx.run_id, iteration = state.iteration, "iteration finished");
            self.emit(
                sink,
                ctx,
                seq,
                state.iteration,
                EventKind::IterFinished { stats: StatsPayload::default() },
            );
            state.phase = Phase::Continue;
        }
    }

    /// Run approval checks for every call, in order, then dispatch only the
    /// allowed subset through the executor. Denied/pending calls never touch
    /// the executor; their slot is filled with a synthesized error result.
    async fn dispatch_tools(
        &self,
        ctx: &RunContext,
        tool_calls: &[ToolCall],
        sink: &Arc<dyn Sink>,
        seq: &SequenceCounter,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let mut results: Vec<Option<ToolResult>> = vec![None; tool_calls.len()];
        let mut dispatchable: Vec<(usize, ToolCall)> = Vec::new();

        for (i, call) in tool_calls.iter().enumerate() {
            if call.exceeds_size_limits() {
                tracing::info!(run_id = %ctx.run_id, iteration, tool_name = %call.name, call_id = %call.id, "tool call rejected: exceeds size limits");
                results[i] = Some(ToolResult::err(&call.id, "tool call exceeds size limits"));
                self.emit_tool_terminal(sink, ctx, seq, iteration, call, true, "exceeds size limits");
                continue;
            }
            let input = call.parsed_input().unwrap_or(serde_json::Value::Null);
            let check = self.approval.check(&ctx.agent_id, &ctx.session_id, &call.id, &call.name, input).await;
            match check {
                Ok((Decision::Allowed, _)) => dispatchable.push((i, call.clone())),
                Ok((Decision::Denied, reason)) => {
                    results[i] = Some(ToolResult::err(&call.id, format!("denied: {reason}")));
                    self.emit_tool_terminal(sink, ctx, seq, iteration, call, true, "denied by policy");
                }
                Ok((Decision::Pending, reason)) => {
                    results[i] = Some(ToolResult::err(&call.id, format!("awaiting approval: {reason}")));
                    self.emit(
                        sink,
                        ctx,
                        seq,
                        iteration,
                        EventKind::ToolApprovalRequired {
                            tool: ToolPayload { call_id: call.id.clone(), tool_name: call.name.clone(), ..Default::default() },
                        },
                    );
                }
                Err(e) => {
                    results[i] = Some(ToolResult::err(&call.id, format!("approval check failed: {e}")));
                }
            }
        }

        if !dispatchable.is_empty() {
            let calls: Vec<ToolCall> = dispatchable.iter().map(|(_, c)| c.clone()).collect();
            let outcomes = self.executor.execute_all(&calls, &ctx.run_id, iteration, seq, cancel).await;
            for ((slot, _), outcome) in dispatchable.into_iter().zip(outcomes) {
                results[slot] = Some(outcome.result);
            }
        }

        results.into_iter().map(|r| r.expect("every slot filled")).collect()
    }

    fn emit_tool_terminal(
        &self,
        sink: &Arc<dyn Sink>,
        ctx: &RunContext,
        seq: &SequenceCounter,
        iteration: u32,
        call: &ToolCall,
        is_error: bool,
        reason: &str,
    ) {
        self.emit(
            sink,
            ctx,
            seq,
            iteration,
            EventKind::ToolFailed {
                tool: ToolPayload {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result_json: reason.to_string(),
                    is_error,
                    ..Default::default()
                },
            },
        );
    }

    async fn stream_turn(
        &self,
        ctx: &RunContext,
        req: CompletionRequest,
        sink: &Arc<dyn Sink>,
        seq: &SequenceCounter,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> Result<(String, Vec<ToolCall>, Usage), LoopError> {
        use futures::StreamExt;

        let mut stream = self.provider.complete(req).await.map_err(|e| LoopError::stream_failed(iteration, e))?;

        let mut full_text = String::new();
        let mut thinking_buf = String::new();
        let mut usage = Usage::default();
        let mut accum = ToolCallAccumulator::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(LoopError::context_cancelled(LoopPhase::Stream, iteration));
                }
                next = stream.next() => {
                    let Some(event) = next else { break };
                    match event.map_err(|e| LoopError::stream_failed(iteration, e))? {
                        ResponseEvent::ThinkingStart => {
                            self.emit(sink, ctx, seq, iteration, EventKind::ThinkingStart);
                        }
                        ResponseEvent::ThinkingDelta(delta) => {
                            thinking_buf.push_str(&delta);
                            self.emit(sink, ctx, seq, iteration, EventKind::ThinkingDelta { stream: StreamPayload { text: delta } });
                        }
                        ResponseEvent::ThinkingEnd => {
                            thinking_buf.clear();
                            self.emit(sink, ctx, seq, iteration, EventKind::ThinkingEnd);
                        }
                        ResponseEvent::TextDelta(delta) => {
                            full_text.push_str(&delta);
                            self.emit(sink, ctx, seq, iteration, EventKind::ModelDelta { stream: StreamPayload { text: delta } });
                        }
                        ResponseEvent::ToolCall { index, id, name, arguments } => {
                            accum.push(index, id, name, arguments);
                        }
                        ResponseEvent::Usage(u) => usage = u,
                        ResponseEvent::Done => break,
                        ResponseEvent::Error(e) => {
                            return Err(LoopError::stream_failed(iteration, anyhow::anyhow!(e)));
                        }
                    }
                }
            }
        }

        let tool_calls = accum.finish();
        Ok((full_text, tool_calls, usage))
    }

    fn emit(&self, sink: &Arc<dyn Sink>, ctx: &RunContext, seq: &SequenceCounter, iter_index: u32, kind: EventKind) {
        sink.emit(AgentEvent::new(ctx.run_id.clone(), seq.next(), iter_index, kind));
    }
}

/// Accumulates streamed tool-call chunks keyed by `id`, falling back to the
/// most recently opened call when a continuation chunk omits it.
struct ToolCallAccumulator {
    order: Vec<PendingCall>,
    by_id: std::collections::HashMap<String, usize>,
    last: Option<usize>,
}

struct PendingCall {
    id: String,
    name: String,
    args_buf: String,
}

impl ToolCallAccumulator {
    fn new() -> Self {
        Self { order: Vec::new(), by_id: std::collections::HashMap::new(), last: None }
    }

    fn push(&mut self, _index: u32, id: Option<String>, name: Option<String>, arguments: String) {
        let slot = match id.filter(|s| !s.is_empty()) {
            Some(id) => *self.by_id.entry(id.clone()).or_insert_with(|| {
                self.order.push(PendingCall { id, name: String::new(), args_buf: String::new() });
                self.order.len() - 1
            }),
            None => match self.last {
                Some(i) => i,
                None => {
                    self.order.push(PendingCall { id: String::new(), name: String::new(), args_buf: String::new() });
                    self.order.len() - 1
                }
            },
        };
        self.last = Some(slot);
        if let Some(n) = name.filter(|s| !s.is_empty()) {
            self.order[slot].name = n;
        }
        self.order[slot].args_buf.push_str(&arguments);
    }

    /// Finalize every accumulated call: calls with no name are dropped
    /// (nothing to dispatch), calls with no id get a synthetic one, and
    /// arguments are parsed-or-repaired into canonical JSON text.
    fn finish(self) -> Vec<ToolCall> {
        let mut out = Vec::with_capacity(self.order.len());
        for (i, pc) in self.order.into_iter().enumerate() {
            if pc.name.is_empty() {
                continue;
            }
            let id = if pc.id.is_empty() { format!("tc_synthetic_{i}") } else { pc.id };
            let input = canonicalize_args(&pc.args_buf);
            out.push(ToolCall::new(id, pc.name, input));
        }
        out
    }
}

/// Parse (or repair) the accumulated argument text into canonical JSON. An
/// empty buffer becomes `{}`; text that cannot be repaired is kept verbatim
/// so dispatch-time parsing fails loudly instead of silently.
fn canonicalize_args(args_buf: &str) -> String {
    if args_buf.is_empty() {
        return "{}".to_string();
    }
    if serde_json::from_str::<serde_json::Value>(args_buf).is_ok() {
        return args_buf.to_string();
    }
    match json_repair::attempt_repair(args_buf) {
        Ok(v) => v.to_string(),
        Err(_) => args_buf.to_string(),
    }
}
