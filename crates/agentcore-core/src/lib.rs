// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The agentic loop driver: ties the tool registry/executor, approval
//! checker, and event sinks together around one model provider to run a
//! conversation turn to completion.
mod error;
mod json_repair;
mod loop_driver;
mod session;
mod session_lock;
mod transcript;

pub use error::{LoopError, LoopErrorKind, LoopPhase};
pub use loop_driver::{ContextPacker, LoopDriver, LoopState, NoopPacker, PackedContext, Phase, RunContext};
pub use session::{InMemorySessionStore, Session, SessionStore};
pub use session_lock::SessionLockRegistry;
