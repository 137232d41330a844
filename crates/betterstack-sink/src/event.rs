// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log events as handed over by the host logging pipeline, and the level
//! filter capability the host supplies alongside them.

use serde_json::{Map, Value};
use time::OffsetDateTime;

/// A structured log event produced by the host logging framework.
///
/// The sink only reads events; it never mutates or retains them past a
/// single `emit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Integer severity code, see [`crate::translate::LEVELS`].
    pub level: u32,
    /// Raw message template, e.g. `"User {user} signed in"`.
    pub message_template: String,
    /// Captured template and context properties.
    pub properties: Map<String, Value>,
    pub timestamp: OffsetDateTime,
    pub error: Option<ErrorInfo>,
}

impl LogEvent {
    #[must_use]
    pub fn new(level: u32, message_template: impl Into<String>) -> Self {
        Self {
            level,
            message_template: message_template.into(),
            properties: Map::new(),
            timestamp: OffsetDateTime::now_utc(),
            error: None,
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }
}

/// Error attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorInfo {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Captures the error chain of any `std::error::Error` as a stack-like trace,
    /// one cause per line.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            stack: Some(stack),
        }
    }

    /// The stack trace, if present and not blank.
    #[must_use]
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack.as_deref().filter(|stack| !stack.trim().is_empty())
    }
}

/// Decides whether events of a given level should be shipped.
///
/// Supplied by the host framework; the sink depends on nothing but this.
pub trait LevelFilter: Send + Sync {
    fn is_enabled(&self, level: u32) -> bool;
}

impl<F> LevelFilter for F
where
    F: Fn(u32) -> bool + Send + Sync,
{
    fn is_enabled(&self, level: u32) -> bool {
        self(level)
    }
}

/// Cumulative bit-mask filter. Each known level code is the previous code with
/// one more bit set, so a mask of `15` enables everything up to `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelMask(pub u32);

impl LevelFilter for LevelMask {
    fn is_enabled(&self, level: u32) -> bool {
        self.0 & level == level
    }
}
