// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use std::env;

/// Better Stack intake used when no URI is configured.
pub const DEFAULT_INGESTION_URI: &str = "https://in.logs.betterstack.com";

/// Configuration accepted once, when the sink is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Source token sent as `Authorization: Bearer <token>`
    pub token: String,
    /// Intake address, defaults to [`DEFAULT_INGESTION_URI`]
    pub ingestion_uri: Option<String>,
    /// Only an explicit `Some(false)` lets delivery errors reach the caller
    pub suppress_errors: Option<bool>,
    /// Persist batches until acknowledged and replay them on the next start
    pub durable: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            ingestion_uri: None,
            suppress_errors: None,
            durable: false,
        }
    }
}

impl SinkConfig {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_iter(env::vars())
    }

    /// Same as [`SinkConfig::from_env`], reading from the supplied pairs.
    pub fn from_env_iter<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let value = value.into();
            match key.as_ref() {
                "BETTERSTACK_SOURCE_TOKEN" => config.token = value,
                "BETTERSTACK_INGESTION_URI" if !value.trim().is_empty() => {
                    config.ingestion_uri = Some(value);
                }
                "BETTERSTACK_SUPPRESS_ERRORS" => {
                    config.suppress_errors = Some(value.to_lowercase() != "false");
                }
                "BETTERSTACK_DURABLE" => config.durable = value.to_lowercase() == "true",
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        let uri = self.ingestion_uri();
        if let Err(e) = reqwest::Url::parse(uri) {
            return Err(ConfigError::InvalidIngestionUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }

    pub fn ingestion_uri(&self) -> &str {
        self.ingestion_uri
            .as_deref()
            .unwrap_or(DEFAULT_INGESTION_URI)
    }

    pub fn suppress_errors(&self) -> bool {
        self.suppress_errors != Some(false)
    }
}
