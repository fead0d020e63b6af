// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Struct definitions and plain-text parsing for the agentic loop's and
//! tool executor's ambient configuration. Locating and merging config
//! files across a search path is left to the embedding application.
mod duration_fmt;
mod identity;
mod loader;
mod schema;

pub use identity::{parse_identity, Identity};
pub use loader::{parse_json, parse_yaml};
pub use schema::{ApprovalPolicy, Config, ExecutorConfig, LoopConfig, ToolOverride};
