// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared conversation and provider types.
//!
//! Concrete LLM wire protocols, provider routing, and model catalogs are
//! external collaborators and are not implemented here — only the
//! [`ModelProvider`] trait boundary and the data types that cross it.
mod mock;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;
