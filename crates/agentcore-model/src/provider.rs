// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The LLM provider boundary. Concrete wire protocols (OpenAI, Anthropic,
/// vendor-specific batching, auth, retries on transport errors) live outside
/// this crate; this trait is the only contract the loop driver depends on.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display and error messages.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// `true` if this provider/model combination accepts a `tools` list on
    /// the request. The driver filters tool schemas out of the request
    /// entirely when this is `false`.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
