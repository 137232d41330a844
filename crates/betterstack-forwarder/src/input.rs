// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited JSON input, one event per line:
//!
//! ```text
//! {"level":15,"messageTemplate":"User {user} signed in","properties":{"user":"alice"}}
//! {"level":3,"message":"boom","timestamp":"2024-05-01T12:00:00Z","error":{"message":"boom","stack":"at main"}}
//! ```

use betterstack_sink::{ErrorInfo, LogEvent};
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputEvent {
    level: u32,
    #[serde(alias = "message")]
    message_template: String,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    timestamp: Option<OffsetDateTime>,
    #[serde(default)]
    error: Option<InputError>,
}

#[derive(Debug, Deserialize)]
struct InputError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    stack: Option<String>,
}

/// Parses one input line. Blank lines yield `None`; a missing timestamp means now.
pub fn parse_line(line: &str) -> Result<Option<LogEvent>, serde_json::Error> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let input: InputEvent = serde_json::from_str(line)?;
    Ok(Some(LogEvent {
        level: input.level,
        message_template: input.message_template,
        properties: input.properties,
        timestamp: input.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
        error: input.error.map(|error| ErrorInfo {
            message: error.message,
            stack: error.stack,
        }),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_full_line() {
        let event = parse_line(
            r#"{"level":3,"messageTemplate":"Checkout {id} failed","properties":{"id":7,"appname":"shop"},"timestamp":"2024-05-01T12:00:00Z","error":{"message":"boom","stack":"at checkout"}}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(event.level, 3);
        assert_eq!(event.message_template, "Checkout {id} failed");
        assert_eq!(event.properties.get("appname"), Some(&Value::from("shop")));
        assert_eq!(event.timestamp, datetime!(2024-05-01 12:00:00 UTC));
        let error = event.error.unwrap();
        assert_eq!(error.message, "boom");
        assert_eq!(error.stack.as_deref(), Some("at checkout"));
    }

    #[test]
    fn test_parse_minimal_line() {
        let event = parse_line(r#"{"level":15,"message":"hello"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.message_template, "hello");
        assert!(event.properties.is_empty());
        assert!(event.error.is_none());
    }

    #[test]
    fn test_parse_blank_line() {
        assert!(parse_line("   ").unwrap().is_none());
    }

    #[test]
    fn test_parse_invalid_line() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"message":"no level"}"#).is_err());
    }
}
