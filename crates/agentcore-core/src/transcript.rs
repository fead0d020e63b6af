// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Repair of an in-progress conversation transcript before it is sent to a
//! model: pair every tool-role result with the assistant tool-call it
//! answers, drop results that answer nothing, and rescue results that were
//! persisted without a `tool_call_id` by assigning them to the oldest
//! still-unanswered call. Idempotent: running it twice changes nothing the
//! first pass didn't already fix.

use agentcore_model::{Message, Role, ToolResult};

pub fn repair(messages: Vec<Message>) -> Vec<Message> {
    let mut pending_ids: Vec<String> = Vec::new();
    let mut repaired = Vec::with_capacity(messages.len());

    for mut msg in messages {
        match msg.role {
            Role::Assistant if !msg.tool_calls.is_empty() => {
                for tc in &msg.tool_calls {
                    pending_ids.push(tc.id.clone());
                }
                repaired.push(msg);
            }
            Role::Tool if !msg.tool_results.is_empty() => {
                let mut kept: Vec<ToolResult> = Vec::with_capacity(msg.tool_results.len());
                for tr in msg.tool_results.drain(..) {
                    let tr = if pending_ids.iter().any(|id| id == &tr.tool_call_id) {
                        tr
                    } else if let Some(oldest) = pending_ids.first().cloned() {
                        ToolResult { tool_call_id: oldest, ..tr }
                    } else {
                        continue;
                    };
                    if let Some(pos) = pending_ids.iter().position(|id| id == &tr.tool_call_id) {
                        pending_ids.remove(pos);
                    }
                    kept.push(tr);
                }
                if !kept.is_empty() {
                    msg.tool_results = kept;
                    repaired.push(msg);
                }
            }
            _ => repaired.push(msg),
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_model::ToolCall;

    #[test]
    fn paired_call_and_result_survive_unchanged() {
        let msgs = vec![
            Message::assistant_with_tool_calls("", vec![ToolCall::new("c1", "shell", "{}")]),
            Message::tool_results(vec![ToolResult::ok("c1", "done")]),
        ];
        let out = repair(msgs);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].tool_results[0].tool_call_id, "c1");
    }

    #[test]
    fn orphan_result_with_no_pending_call_is_dropped() {
        let msgs = vec![Message::tool_results(vec![ToolResult::ok("ghost", "x")])];
        let out = repair(msgs);
        assert!(out.is_empty());
    }

    #[test]
    fn unkeyed_result_is_assigned_to_oldest_unmatched_call() {
        let msgs = vec![
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("c1", "shell", "{}"), ToolCall::new("c2", "read_file", "{}")],
            ),
            Message::tool_results(vec![ToolResult::ok("", "first result")]),
        ];
        let out = repair(msgs);
        assert_eq!(out[1].tool_results[0].tool_call_id, "c1");
    }

    #[test]
    fn second_unkeyed_result_lands_on_next_oldest_call() {
        let msgs = vec![
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("c1", "shell", "{}"), ToolCall::new("c2", "read_file", "{}")],
            ),
            Message::tool_results(vec![ToolResult::ok("", "a"), ToolResult::ok("", "b")]),
        ];
        let out = repair(msgs);
        assert_eq!(out[1].tool_results[0].tool_call_id, "c1");
        assert_eq!(out[1].tool_results[1].tool_call_id, "c2");
    }

    #[test]
    fn repair_is_idempotent() {
        let msgs = vec![
            Message::assistant_with_tool_calls("", vec![ToolCall::new("c1", "shell", "{}")]),
            Message::tool_results(vec![ToolResult::ok("c1", "done")]),
        ];
        let once = repair(msgs);
        let twice = repair(once.clone());
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[1].tool_results[0].tool_call_id, twice[1].tool_results[0].tool_call_id);
    }

    #[test]
    fn preserves_message_order_around_a_drop() {
        let msgs = vec![
            Message::user("hi"),
            Message::tool_results(vec![ToolResult::ok("ghost", "x")]),
            Message::assistant("hello"),
        ];
        let out = repair(msgs);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::User);
        assert_eq!(out[1].role, Role::Assistant);
    }
}
