// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::event::AgentEvent;

/// An observer that consumes agent events. Emission MUST NOT block
/// execution and MUST NOT panic, even with misbehaving internals — a
/// slow or broken consumer simply misses events.
pub trait Sink: Send + Sync {
    fn emit(&self, event: AgentEvent);
}

/// Forwards events into a bounded channel. Drops the event (rather than
/// blocking) when the buffer is full or the receiver has gone away.
pub struct ChannelSink {
    tx: mpsc::Sender<AgentEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx }
    }
}

impl Sink for ChannelSink {
    fn emit(&self, event: AgentEvent) {
        // try_send never blocks: full buffer or closed receiver both just drop.
        let _ = self.tx.try_send(event);
    }
}

/// Forwards each event to a plain closure, isolating any panic inside it.
pub struct CallbackSink<F: Fn(AgentEvent) + Send + Sync> {
    callback: F,
}

impl<F: Fn(AgentEvent) + Send + Sync> CallbackSink<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(AgentEvent) + Send + Sync> Sink for CallbackSink<F> {
    fn emit(&self, event: AgentEvent) {
        let callback = &self.callback;
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            tracing::warn!("event sink callback panicked; event dropped");
        }
    }
}

/// Fans an event out to multiple children in stable order. `None` entries
/// are skipped. Each child's emission is isolated: a panic in one does not
/// prevent delivery to the rest.
#[derive(Default)]
pub struct MultiSink {
    children: Vec<Option<Arc<dyn Sink>>>,
}

impl MultiSink {
    pub fn new(children: Vec<Option<Arc<dyn Sink>>>) -> Self {
        Self { children }
    }

    pub fn push(&mut self, sink: Arc<dyn Sink>) {
        self.children.push(Some(sink));
    }
}

impl Sink for MultiSink {
    fn emit(&self, event: AgentEvent) {
        for child in self.children.iter().flatten() {
            let child = child.clone();
            let event = event.clone();
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| child.emit(event)));
        }
    }
}

/// Discards every event. Useful as a default when no observer is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopSink;

impl Sink for NopSink {
    fn emit(&self, _event: AgentEvent) {}
}

/// Maps an [`AgentEvent`] into a caller-defined chunk type `T` and forwards
/// it over a bounded channel, the same way [`ChannelSink`] does for raw
/// events. `map` returning `None` skips the event entirely.
pub struct ChunkAdapterSink<T: Send + 'static> {
    tx: mpsc::Sender<T>,
    map: Box<dyn Fn(AgentEvent) -> Option<T> + Send + Sync>,
}

impl<T: Send + 'static> ChunkAdapterSink<T> {
    pub fn new(tx: mpsc::Sender<T>, map: impl Fn(AgentEvent) -> Option<T> + Send + Sync + 'static) -> Self {
        Self { tx, map: Box::new(map) }
    }
}

impl<T: Send + 'static> Sink for ChunkAdapterSink<T> {
    fn emit(&self, event: AgentEvent) {
        if let Some(chunk) = (self.map)(event) {
            let _ = self.tx.try_send(chunk);
        }
    }
}
