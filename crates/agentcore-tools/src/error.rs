// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;

/// Tool failure taxonomy. Classification is driven by message substring
/// matching; explicit constructors (e.g. [`ToolError::timeout`]) bypass
/// inference entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    Timeout,
    Network,
    RateLimit,
    NotFound,
    InvalidInput,
    Permission,
    Execution,
    Panic,
    Unknown,
}

impl ToolErrorKind {
    /// `{timeout, network, rate_limit}` are retryable; everything else,
    /// `panic` most of all, is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network | Self::RateLimit)
    }
}

#[derive(Debug, Clone)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolError {}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::RateLimit, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidInput, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Permission, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Execution, message)
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Panic, message)
    }

    /// Infer a kind from a free-form error message via substring matching.
    /// Falls back to `Execution` — the tool ran and reported a failure, as
    /// opposed to the transport-level failures the other kinds describe.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let kind = if lower.contains("timeout") || lower.contains("timed out") {
            ToolErrorKind::Timeout
        } else if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
        {
            ToolErrorKind::RateLimit
        } else if lower.contains("connection")
            || lower.contains("network")
            || lower.contains("dns")
            || lower.contains("broken pipe")
        {
            ToolErrorKind::Network
        } else if lower.contains("not found") || lower.contains("404") || lower.contains("no such file") {
            ToolErrorKind::NotFound
        } else if lower.contains("permission denied")
            || lower.contains("forbidden")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("401")
        {
            ToolErrorKind::Permission
        } else if lower.contains("invalid") || lower.contains("bad request") || lower.contains("400") {
            ToolErrorKind::InvalidInput
        } else {
            ToolErrorKind::Execution
        };
        Self::new(kind, message)
    }
}
