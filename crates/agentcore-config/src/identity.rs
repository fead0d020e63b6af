// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Parsing for an already-loaded persona/identity document. Finding and
//! reading the file is the embedding application's job; this module only
//! turns its text into a typed, optional descriptor.

const PLACEHOLDERS: &[&str] = &["tbd", "unset", "n/a", "none", "todo"];

/// A persona descriptor parsed from a Markdown bullet list. Every field is
/// optional: a document missing a key simply leaves it `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: Option<String>,
    pub emoji: Option<String>,
    pub theme: Option<String>,
    pub creature: Option<String>,
    pub vibe: Option<String>,
    pub avatar: Option<String>,
}

impl Identity {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.emoji.is_none()
            && self.theme.is_none()
            && self.creature.is_none()
            && self.vibe.is_none()
            && self.avatar.is_none()
    }

    fn set(&mut self, key: &str, value: String) {
        match key {
            "name" => self.name = Some(value),
            "emoji" => self.emoji = Some(value),
            "theme" => self.theme = Some(value),
            "creature" => self.creature = Some(value),
            "vibe" => self.vibe = Some(value),
            "avatar" => self.avatar = Some(value),
            _ => {}
        }
    }
}

/// Parse a Markdown bullet list matching `- **Key**: Value` into an
/// [`Identity`]. Headers and non-list lines are ignored. Returns `None` if
/// no recognized field survives parsing.
pub fn parse_identity(text: &str) -> Option<Identity> {
    let mut identity = Identity::default();

    for line in text.lines() {
        let Some((key, value)) = parse_bullet(line) else { continue };
        let value = strip_comment(&value);
        let value = unquote(value);
        if value.is_empty() || PLACEHOLDERS.contains(&value.to_lowercase().as_str()) {
            continue;
        }
        identity.set(&key.to_lowercase(), value.to_string());
    }

    if identity.is_empty() {
        None
    } else {
        Some(identity)
    }
}

/// Extracts `(key, value)` from a `- **Key**: Value` line, or `None` if the
/// line doesn't match that shape.
fn parse_bullet(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let rest = line.strip_prefix('-')?.trim_start();
    let rest = rest.strip_prefix("**")?;
    let (key, rest) = rest.split_once("**")?;
    let value = rest.trim_start().strip_prefix(':')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

fn strip_comment(value: &str) -> &str {
    match value.find("//") {
        Some(idx) => value[..idx].trim_end(),
        None => value,
    }
}

fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        let is_quoted =
            (bytes[0] == b'"' && bytes[trimmed.len() - 1] == b'"') || (bytes[0] == b'\'' && bytes[trimmed.len() - 1] == b'\'');
        if is_quoted {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}
