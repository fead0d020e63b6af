// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Best-effort repair of malformed JSON emitted by a model mid tool-call.
//!
//! Models occasionally emit invalid escape sequences or truncate arguments
//! when a stream is cut short. These repairs are tried, in order, before the
//! loop driver gives up and synthesizes an error result for the call instead
//! of dispatching it.

/// Attempt to parse `json_str` as-is, then with invalid escapes fixed, then
/// with a best-effort closing brace/quote appended for a truncated object.
pub fn attempt_repair(json_str: &str) -> Result<serde_json::Value, serde_json::Error> {
    if let Ok(v) = serde_json::from_str(json_str) {
        return Ok(v);
    }

    let fixed = fix_invalid_escapes(json_str);
    if let Ok(v) = serde_json::from_str(&fixed) {
        return Ok(v);
    }

    if !fixed.trim().ends_with('}') {
        let mut completed = fixed.clone();
        let quote_count = fixed.chars().filter(|&c| c == '"').count();
        if quote_count % 2 == 1 {
            completed.push('"');
        }
        if !completed.trim().ends_with('}') {
            completed.push('}');
        }
        if let Ok(v) = serde_json::from_str(&completed) {
            return Ok(v);
        }
    }

    // Re-run the original parse to surface a real serde_json::Error to the caller.
    serde_json::from_str(json_str)
}

/// Replace escape sequences that aren't valid JSON (`\c`, `\(`, ...) with a
/// doubled backslash so the string round-trips through `serde_json`.
fn fix_invalid_escapes(json_str: &str) -> String {
    let mut result = String::with_capacity(json_str.len() + 16);
    let mut chars = json_str.chars();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => match chars.next() {
                    Some(next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                        result.push('\\');
                        result.push(next);
                    }
                    Some(next) => {
                        result.push('\\');
                        result.push('\\');
                        result.push(next);
                    }
                    None => result.push('\\'),
                },
                '"' => {
                    in_string = false;
                    result.push('"');
                }
                _ => result.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            result.push(c);
        }
    }
    result
}
