// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in conversation history.
///
/// `tool_calls` is populated only when `role == Assistant`; `tool_results`
/// only when `role == Tool`. Both are empty otherwise. System-role messages
/// are never part of a message list handed to a provider — they are hoisted
/// into a separate system channel by the loop driver before the request is
/// built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Message {
    fn bare(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            branch_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::bare(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::bare(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, text)
    }

    /// An assistant message carrying a tool-call list (content may be empty
    /// when the model produced no accompanying text).
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut m = Self::bare(Role::Assistant, text);
        m.tool_calls = tool_calls;
        m
    }

    /// A tool-role message carrying one or more results, in the same order
    /// as the tool calls they answer.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        let mut m = Self::bare(Role::Tool, "");
        m.tool_results = results;
        m
    }

    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Approximate token count used for context management: four chars per
    /// token, minimum one, plus a flat per-attachment estimate.
    pub fn approx_tokens(&self) -> usize {
        let mut chars = self.content.len();
        for tc in &self.tool_calls {
            chars += tc.name.len() + tc.input.len();
        }
        for tr in &self.tool_results {
            chars += tr.content.len();
        }
        let body = (chars / 4).max(1);
        let attachment_tokens: usize = self.attachments.len() * 765;
        body + attachment_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// An ordered attachment reference carried by a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Maximum accepted size of a tool call's raw JSON input, in bytes.
pub const MAX_TOOL_INPUT_BYTES: usize = 10 * 1024 * 1024;
/// Maximum accepted length of a tool name.
pub const MAX_TOOL_NAME_CHARS: usize = 256;

/// A model-emitted request naming a tool and carrying raw JSON input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON text, not yet parsed. Accumulated incrementally by the loop
    /// driver across streamed deltas; validated at dispatch time.
    pub input: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), input: input.into() }
    }

    /// `true` if either the name or the input exceed the configured caps.
    pub fn exceeds_size_limits(&self) -> bool {
        self.name.chars().count() > MAX_TOOL_NAME_CHARS || self.input.len() > MAX_TOOL_INPUT_BYTES
    }

    /// Parse `input` as a JSON value.
    pub fn parsed_input(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.input)
    }
}

/// The outcome of dispatching a tool call, fed back into the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
            attachments: Vec::new(),
        }
    }

    pub fn err(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
            attachments: Vec::new(),
        }
    }
}

/// A tool schema advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Request sent to a model provider for one iteration.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub stream: bool,
}

/// A single streamed event from the model.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    TextDelta(String),
    ThinkingStart,
    ThinkingDelta(String),
    ThinkingEnd,
    /// The model wants to call a tool. `index` keys chunk accumulation when
    /// `id` is omitted on continuation chunks; arguments may arrive
    /// incrementally across multiple events sharing the same `index`/`id`.
    ToolCall { index: u32, id: Option<String>, name: Option<String>, arguments: String },
    Usage(Usage),
    Done,
    Error(String),
}

/// Token usage from one provider turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_write_tokens: u32,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
