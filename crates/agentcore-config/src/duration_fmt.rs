// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Serde (de)serialization of [`Duration`] fields as human-readable strings
//! (`"5m"`, `"30s"`) via `humantime`, used by every duration-valued field in
//! [`crate::schema`].

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

/// Same wire format for `Option<Duration>` fields, used by per-tool
/// overrides where an unset field should fall back to the executor default
/// rather than parse as a duration.
pub mod option {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| humantime::parse_duration(&t).map_err(serde::de::Error::custom)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::duration_fmt")]
        d: Duration,
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct OptWrapper {
        #[serde(with = "crate::duration_fmt::option")]
        d: Option<Duration>,
    }

    #[test]
    fn parses_minutes_and_seconds() {
        let w: Wrapper = serde_json::from_str(r#"{"d":"5m"}"#).unwrap();
        assert_eq!(w.d, Duration::from_secs(300));
        let w: Wrapper = serde_json::from_str(r#"{"d":"30s"}"#).unwrap();
        assert_eq!(w.d, Duration::from_secs(30));
    }

    #[test]
    fn round_trips_through_serialize() {
        let w = Wrapper { d: Duration::from_secs(90) };
        let text = serde_json::to_string(&w).unwrap();
        let back: Wrapper = serde_json::from_str(&text).unwrap();
        assert_eq!(back.d, w.d);
    }

    #[test]
    fn invalid_duration_text_is_rejected() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"d":"nope"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn option_variant_handles_absence_and_presence() {
        let w: OptWrapper = serde_json::from_str(r#"{"d":null}"#).unwrap();
        assert_eq!(w.d, None);
        let w: OptWrapper = serde_json::from_str(r#"{"d":"10s"}"#).unwrap();
        assert_eq!(w.d, Some(Duration::from_secs(10)));
    }
}
