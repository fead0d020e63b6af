// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use agentcore_events::{AgentEvent, EventKind, Sink, ToolPayload};
use agentcore_model::{ToolCall, ToolResult};

use crate::error::{ToolError, ToolErrorKind};
use crate::registry::ToolRegistry;

/// Per-tool execution envelope, overlaid onto [`ExecutorConfig::default_call`]
/// for any tool named in `overrides`.
#[derive(Debug, Clone, Copy)]
pub struct CallConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
    pub priority: i32,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 1,
            retry_backoff: Duration::from_millis(200),
            max_retry_backoff: Duration::from_secs(10),
            priority: 0,
        }
    }
}

/// Executor-wide configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// `0` disables the concurrency bound entirely (no semaphore).
    pub max_concurrency: usize,
    pub default_call: CallConfig,
    pub overrides: HashMap<String, CallConfig>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_concurrency: 4, default_call: CallConfig::default(), overrides: HashMap::new() }
    }
}

impl ExecutorConfig {
    fn resolve(&self, tool_name: &str) -> CallConfig {
        self.overrides.get(tool_name).copied().unwrap_or(self.default_call)
    }
}

/// Cumulative counters across every [`ToolExecutor::execute_all`] call on a
/// given executor instance.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    pub total_executions: AtomicU64,
    pub total_retries: AtomicU64,
    pub total_failures: AtomicU64,
    pub total_panics: AtomicU64,
}

/// A single tool call's outcome, carrying the execution metadata the model
/// never sees alongside the [`ToolResult`] it does.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub result: ToolResult,
    pub attempts: u32,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Concurrent, retry-aware, timeout-bounded tool dispatcher.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
    semaphore: Option<Arc<Semaphore>>,
    sink: Arc<dyn Sink>,
    metrics: Arc<ExecutorMetrics>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutorConfig, sink: Arc<dyn Sink>) -> Self {
        let semaphore =
            if config.max_concurrency == 0 { None } else { Some(Arc::new(Semaphore::new(config.max_concurrency))) };
        Self { registry, config, semaphore, sink, metrics: Arc::new(ExecutorMetrics::default()) }
    }

    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }

    /// Run every call sequentially, in input order. Useful for tests and for
    /// tools that must not interleave.
    pub async fn execute_sequential(
        &self,
        calls: &[ToolCall],
        run_id: &str,
        iteration: u32,
        seq: &agentcore_events::SequenceCounter,
        cancel: &CancellationToken,
    ) -> Vec<ExecutionOutcome> {
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            out.push(self.execute_one(call, run_id, iteration, seq, cancel).await);
        }
        out
    }

    /// Run every call concurrently, bounded by `max_concurrency`, and return
    /// results in the same order as `calls` regardless of completion order.
    #[tracing::instrument(skip_all, fields(run_id, iteration, calls = calls.len()))]
    pub async fn execute_all(
        &self,
        calls: &[ToolCall],
        run_id: &str,
        iteration: u32,
        seq: &agentcore_events::SequenceCounter,
        cancel: &CancellationToken,
    ) -> Vec<ExecutionOutcome> {
        let mut ordered: Vec<(usize, &ToolCall)> = calls.iter().enumerate().collect();
        ordered.sort_by(|(_, a), (_, b)| {
            let pa = self.config.resolve(&a.name).priority;
            let pb = self.config.resolve(&b.name).priority;
            pb.cmp(&pa)
        });

        let mut slots: Vec<Option<ExecutionOutcome>> = (0..calls.len()).map(|_| None).collect();
        let mut futures = Vec::with_capacity(ordered.len());
        for (idx, call) in ordered {
            futures.push(async move { (idx, self.execute_one(call, run_id, iteration, seq, cancel).await) });
        }
        let results = futures::future::join_all(futures).await;
        for (idx, outcome) in results {
            slots[idx] = Some(outcome);
        }
        slots.into_iter().map(|s| s.expect("every index filled")).collect()
    }

    /// Execute a single call under the semaphore, attempt loop, panic
    /// barrier, and eventing described in the executor's contract.
    pub async fn execute_one(
        &self,
        call: &ToolCall,
        run_id: &str,
        iteration: u32,
        seq: &agentcore_events::SequenceCounter,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let cfg = self.config.resolve(&call.name);
        self.metrics.total_executions.fetch_add(1, Ordering::Relaxed);

        tracing::info!(run_id, iteration, tool_name = %call.name, call_id = %call.id, "tool dispatch started");
        self.emit(
            run_id,
            seq,
            iteration,
            EventKind::ToolStarted {
                tool: ToolPayload { call_id: call.id.clone(), tool_name: call.name.clone(), args_json: call.input.clone(), ..Default::default() },
            },
        );

        let start = Instant::now();

        let _permit = match &self.semaphore {
            Some(sem) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return self.finish_backpressure(call, run_id, iteration, seq, start);
                    }
                    permit = sem.clone().acquire_owned() => {
                        match permit {
                            Ok(p) => Some(p),
                            Err(_) => return self.finish_backpressure(call, run_id, iteration, seq, start),
                        }
                    }
                }
            }
            None => None,
        };

        let Some(tool) = self.registry.get(&call.name) else {
            self.metrics.total_failures.fetch_add(1, Ordering::Relaxed);
            let result = ToolResult::err(&call.id, format!("unknown tool: {}", call.name));
            self.emit_terminal(run_id, iteration, seq, call, &result, false, start.elapsed());
            return ExecutionOutcome { result, attempts: 1, timed_out: false, duration: start.elapsed() };
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return self.finish_backpressure(call, run_id, iteration, seq, start);
            }

            let call_owned = call.clone();
            let tool = tool.clone();
            let attempt_fut = async move { tool.execute(&call_owned).await };

            let timed = tokio::time::timeout(cfg.timeout, AssertUnwindSafe(attempt_fut).catch_unwind());

            let outcome: Result<Result<ToolResult, ToolError>, ()> = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(()),
                r = timed => match r {
                    Ok(Ok(inner)) => Ok(inner),
                    Ok(Err(_panic)) => {
                        self.metrics.total_panics.fetch_add(1, Ordering::Relaxed);
                        Ok(Err(ToolError::panic(format!("tool {} panicked", call.name))))
                    }
                    Err(_elapsed) => Ok(Err(ToolError::timeout(format!("tool {} timed out after {:?}", call.name, cfg.timeout)))),
                },
            };

            match outcome {
                Err(()) => return self.finish_backpressure(call, run_id, iteration, seq, start),
                Ok(Ok(result)) => {
                    self.emit_terminal(run_id, iteration, seq, call, &result, false, start.elapsed());
                    return ExecutionOutcome { result, attempts: attempt, timed_out: false, duration: start.elapsed() };
                }
                Ok(Err(err)) => {
                    let timed_out = err.kind == ToolErrorKind::Timeout;
                    let retryable = err.kind != ToolErrorKind::Panic && err.is_retryable();
                    let is_final = attempt >= cfg.max_attempts;
                    if !retryable || is_final {
                        self.metrics.total_failures.fetch_add(1, Ordering::Relaxed);
                        let result = ToolResult::err(&call.id, err.message.clone());
                        self.emit_terminal(run_id, iteration, seq, call, &result, timed_out, start.elapsed());
                        return ExecutionOutcome { result, attempts: attempt, timed_out, duration: start.elapsed() };
                    }
                    self.metrics.total_retries.fetch_add(1, Ordering::Relaxed);
                    let backoff = cfg.retry_backoff.saturating_mul(1u32 << (attempt - 1).min(20));
                    let backoff = backoff.min(cfg.max_retry_backoff);
                    tracing::info!(run_id, iteration, tool_name = %call.name, call_id = %call.id, attempt, ?backoff, "tool retrying after failure");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.finish_backpressure(call, run_id, iteration, seq, start),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    fn finish_backpressure(
        &self,
        call: &ToolCall,
        run_id: &str,
        iteration: u32,
        seq: &agentcore_events::SequenceCounter,
        start: Instant,
    ) -> ExecutionOutcome {
        self.metrics.total_failures.fetch_add(1, Ordering::Relaxed);
        let result = ToolResult::err(&call.id, "tool execution cancelled: backpressure or context done");
        self.emit_terminal(run_id, iteration, seq, call, &result, false, start.elapsed());
        ExecutionOutcome { result, attempts: 1, timed_out: false, duration: start.elapsed() }
    }

    fn emit_terminal(
        &self,
        run_id: &str,
        iteration: u32,
        seq: &agentcore_events::SequenceCounter,
        call: &ToolCall,
        result: &ToolResult,
        timed_out: bool,
        duration: Duration,
    ) {
        tracing::info!(
            run_id,
            iteration,
            tool_name = %call.name,
            call_id = %call.id,
            is_error = result.is_error,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            "tool dispatch finished"
        );
        let payload = ToolPayload {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result_json: result.content.clone(),
            is_error: result.is_error,
            duration_ms: Some(duration.as_millis() as u64),
            timed_out: Some(timed_out),
            ..Default::default()
        };
        let kind = if timed_out {
            EventKind::ToolTimeout { tool: payload }
        } else if result.is_error {
            EventKind::ToolFailed { tool: payload }
        } else {
            EventKind::ToolFinished { tool: payload }
        };
        self.emit(run_id, seq, iteration, kind);
    }

    fn emit(&self, run_id: &str, seq: &agentcore_events::SequenceCounter, iteration: u32, kind: EventKind) {
        let event = AgentEvent::new(run_id, seq.next(), iteration, kind);
        self.sink.emit(event);
    }
}
