// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Translation of [`LogEvent`]s into the Better Stack intake record shape.
//!
//! ```text
//! {
//!   "level": "info",
//!   "message": "User alice signed in",
//!   "properties": { "user": "alice", "appname": "svc-a" },
//!   "dt": "2024-05-01T12:00:00Z",
//!   "platform": "browser",
//!   "osplatform": "browser",
//!   "syslog": {
//!     "appname": "svc-a",
//!     "host": "localhost",
//!     "hostname": "localhost",
//!     "logtail@11993": { "ExceptionDetail": "..." }
//!   }
//! }
//! ```
//!
//! Translation is pure: no I/O, and the same event always yields the same record.

use crate::event::LogEvent;
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Severity codes understood by the intake. Codes outside this table produce a
/// record without a `level` field.
pub const LEVELS: &[(u32, &str)] = &[
    (0, "none"),
    (1, "critical"),
    (3, "error"),
    (7, "warning"),
    (15, "info"),
    (31, "debug"),
    (63, "trace"),
];

const PLATFORM: &str = "browser";
const LOCAL_HOST: &str = "localhost";
const UNKNOWN_APP: &str = "unknown";

#[must_use]
pub fn level_name(code: u32) -> Option<&'static str> {
    LEVELS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

/// One log line as accepted by the intake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<&'static str>,
    pub message: String,
    pub properties: Map<String, Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub dt: OffsetDateTime,
    pub platform: &'static str,
    pub osplatform: &'static str,
    pub syslog: Syslog,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Syslog {
    pub appname: String,
    pub host: &'static str,
    pub hostname: &'static str,
    #[serde(rename = "logtail@11993")]
    pub diagnostics: Diagnostics,
}

/// Structured-data element carrying error details. Serializes as `{}` when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    #[serde(rename = "ExceptionDetail", skip_serializing_if = "Option::is_none")]
    pub exception_detail: Option<String>,
}

#[must_use]
pub fn translate(event: &LogEvent) -> OutboundRecord {
    let appname = match event.properties.get("appname") {
        Some(Value::String(name)) => name.clone(),
        _ => UNKNOWN_APP.to_string(),
    };

    let diagnostics = Diagnostics {
        exception_detail: event
            .error
            .as_ref()
            .and_then(|error| error.stack_trace())
            .map(str::to_string),
    };

    OutboundRecord {
        level: level_name(event.level),
        message: render_template(&event.message_template, &event.properties),
        properties: event.properties.clone(),
        dt: event.timestamp,
        platform: PLATFORM,
        osplatform: PLATFORM,
        syslog: Syslog {
            appname,
            host: LOCAL_HOST,
            hostname: LOCAL_HOST,
            diagnostics,
        },
    }
}

/// Serializes a whole batch into the JSON array body sent to the intake.
pub fn serialize_batch(events: &[&LogEvent]) -> Result<String, serde_json::Error> {
    let records: Vec<OutboundRecord> = events.iter().map(|event| translate(event)).collect();
    serde_json::to_string(&records)
}

/// Renders a message template against event properties.
///
/// Holes are `{name}`, with optional `@` (destructure) or `$` (stringify)
/// operators. A hole without a matching property is kept as written, and
/// `{{`/`}}` produce literal braces.
#[must_use]
pub fn render_template(template: &str, properties: &Map<String, Value>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        rendered.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            rendered.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            rendered.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            rendered.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(end) = tail.find('}') else {
            rendered.push_str(tail);
            return rendered;
        };
        let hole = &tail[1..end];
        let name = hole.trim_start_matches(['@', '$']);
        match properties.get(name) {
            Some(Value::String(text)) => rendered.push_str(text),
            Some(value) => rendered.push_str(&value.to_string()),
            None => rendered.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }

    rendered.push_str(rest);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ErrorInfo;
    use serde_json::json;
    use time::macros::datetime;

    fn event(level: u32) -> LogEvent {
        LogEvent::new(level, "hello").with_timestamp(datetime!(2024-05-01 12:00:00 UTC))
    }

    #[test]
    fn test_known_levels_map_to_table() {
        for (code, name) in LEVELS {
            assert_eq!(translate(&event(*code)).level, Some(*name));
        }
    }

    #[test]
    fn test_unknown_level_is_absent() {
        for code in [2, 4, 8, 14, 64, u32::MAX] {
            let record = translate(&event(code));
            assert_eq!(record.level, None);
            let json = serde_json::to_value(&record).unwrap();
            assert!(json.get("level").is_none(), "level {code} should be absent");
        }
    }

    #[test]
    fn test_appname_from_properties() {
        let record = translate(&event(15).with_property("appname", "svc-a"));
        assert_eq!(record.syslog.appname, "svc-a");

        let record = translate(&event(15));
        assert_eq!(record.syslog.appname, "unknown");
    }

    #[test]
    fn test_non_string_appname_falls_back() {
        let record = translate(&event(15).with_property("appname", 42));
        assert_eq!(record.syslog.appname, "unknown");
    }

    #[test]
    fn test_exception_detail_from_stack() {
        let record = translate(
            &event(3).with_error(ErrorInfo::new("boom").with_stack("Error: boom\n  at main")),
        );
        assert_eq!(
            record.syslog.diagnostics.exception_detail.as_deref(),
            Some("Error: boom\n  at main")
        );
    }

    #[test]
    fn test_empty_diagnostics_without_stack() {
        for record in [
            translate(&event(3)),
            translate(&event(3).with_error(ErrorInfo::new("boom"))),
            translate(&event(3).with_error(ErrorInfo::new("boom").with_stack(""))),
        ] {
            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json["syslog"]["logtail@11993"], json!({}));
        }
    }

    #[test]
    fn test_record_shape() {
        let record = translate(
            &event(15)
                .with_property("appname", "svc-a")
                .with_property("user", "alice"),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            json!({
                "level": "info",
                "message": "hello",
                "properties": { "appname": "svc-a", "user": "alice" },
                "dt": "2024-05-01T12:00:00Z",
                "platform": "browser",
                "osplatform": "browser",
                "syslog": {
                    "appname": "svc-a",
                    "host": "localhost",
                    "hostname": "localhost",
                    "logtail@11993": {}
                }
            })
        );
    }

    #[test]
    fn test_serialize_batch_is_array() {
        let first = event(15);
        let second = event(3);
        let body = serialize_batch(&[&first, &second]).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["level"], "error");
    }

    #[test]
    fn test_render_template() {
        let properties = json!({
            "user": "alice",
            "count": 3,
            "cart": { "items": 2 }
        });
        let properties = properties.as_object().unwrap();

        assert_eq!(
            render_template("{user} bought {count} items", properties),
            "alice bought 3 items"
        );
        assert_eq!(
            render_template("cart {@cart} for {$user}", properties),
            r#"cart {"items":2} for alice"#
        );
        assert_eq!(
            render_template("missing {nobody} stays", properties),
            "missing {nobody} stays"
        );
        assert_eq!(
            render_template("{{literal}} and }} and {unterminated", properties),
            "{literal} and } and {unterminated"
        );
    }
}
