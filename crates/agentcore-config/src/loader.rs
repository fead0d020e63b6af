// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::schema::Config;

/// Parse a [`Config`] from YAML text.
///
/// Locating config files across search paths and merging multiple sources
/// is the embedding application's job; this crate only turns text into a
/// typed, validated struct.
pub fn parse_yaml(text: &str) -> anyhow::Result<Config> {
    match serde_yaml::from_str(text) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!(error = %e, "config yaml parse failed");
            Err(e.into())
        }
    }
}

/// Parse a [`Config`] from JSON text.
pub fn parse_json(text: &str) -> anyhow::Result<Config> {
    match serde_json::from_str(text) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!(error = %e, "config json parse failed");
            Err(e.into())
        }
    }
}
