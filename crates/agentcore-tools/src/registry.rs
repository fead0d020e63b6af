// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use agentcore_model::ToolSchema;

use crate::Tool;

/// Default cap on the number of distinct tools a registry will hold.
pub const DEFAULT_MAX_TOOLS: usize = 1024;

/// Thread-safe `name -> tool` map with a size-bounded capacity.
///
/// Lookups take a read lock and release it before the caller invokes the
/// tool, so a slow or panicking tool execution never holds the registry
/// lock.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    max_tools: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("tool registry is full ({max} tools)")]
    Full { max: usize },
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TOOLS)
    }

    pub fn with_capacity(max_tools: usize) -> Self {
        Self { tools: RwLock::new(HashMap::new()), max_tools }
    }

    /// Register a tool, overwriting any existing tool with the same name.
    /// Rejected once the registry holds `max_tools` *distinct* names,
    /// unless this call is an overwrite of an existing name.
    pub fn register(&self, tool: impl Tool + 'static) -> Result<(), RegisterError> {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().unwrap();
        if !tools.contains_key(&name) && tools.len() >= self.max_tools {
            return Err(RegisterError::Full { max: self.max_tools });
        }
        tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schemas for every registered tool, sorted by name for deterministic
    /// request construction.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let tools = self.tools.read().unwrap();
        let mut schemas: Vec<ToolSchema> = tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
