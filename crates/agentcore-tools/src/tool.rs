// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use agentcore_model::{ToolCall, ToolResult, ToolSchema};

use crate::error::ToolError;

/// A unit the agentic loop can invoke by name. Individual tool
/// implementations are opaque to this crate: only `name`, `schema`, and
/// `execute` are required.
///
/// Returning `Err` signals a transport/execution-level failure that the
/// executor's retry loop may act on; returning `Ok(ToolResult { is_error:
/// true, .. })` signals a domain-level failure the tool wants the model to
/// see, which is never retried.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema describing the call's `input` object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError>;

    /// The schema advertised to the model for this tool.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(&call.id, call.input.clone()))
        }
    }

    #[tokio::test]
    async fn tool_executes_and_echoes_input() {
        let call = ToolCall::new("c1", "echo", "hi");
        let result = EchoTool.execute(&call).await.unwrap();
        assert_eq!(result.content, "hi");
        assert!(!result.is_error);
    }

    #[test]
    fn schema_reflects_name_description_and_parameters() {
        let schema = EchoTool.schema();
        assert_eq!(schema.name, "echo");
        assert_eq!(schema.description, "echoes its input");
        assert_eq!(schema.parameters, json!({ "type": "object" }));
    }
}
