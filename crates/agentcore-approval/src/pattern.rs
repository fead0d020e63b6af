// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Canonicalize a tool name or pattern for comparison: lowercased and
/// trimmed of surrounding whitespace.
pub fn canonicalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Test whether `candidate` matches a glob-like `pattern`.
///
/// Supported forms, matched in this priority order against the
/// canonicalized strings:
/// - the reserved `mcp:*`, which matches any name starting with `mcp:`
/// - `*`, which matches anything
/// - `prefix*`, a trailing wildcard
/// - `*suffix`, a leading wildcard
/// - an exact match otherwise
///
/// Patterns containing `*` only at the start or end are supported; a
/// pattern with wildcards in the middle or at both ends is treated as a
/// literal (exact-match) pattern, since the spec's pattern grammar defines
/// no other shape.
pub fn matches(pattern: &str, candidate: &str) -> bool {
    let pattern = canonicalize(pattern);
    let candidate = canonicalize(candidate);

    if pattern == "mcp:*" {
        return candidate.starts_with("mcp:");
    }
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.is_empty() {
            return candidate.starts_with(prefix);
        }
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        if !suffix.is_empty() {
            return candidate.ends_with(suffix);
        }
    }
    candidate == pattern
}

/// Test whether `candidate` matches any pattern in `patterns`.
pub fn matches_any(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| matches(p, candidate))
}
