// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while validating sink configuration. Always fatal for construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: a source token is required")]
    MissingToken,

    #[error("Invalid configuration: ingestion URI '{uri}' is not a valid URL: {reason}")]
    InvalidIngestionUri { uri: String, reason: String },
}

/// A batch could not be delivered to the ingestion service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("ingestion service responded {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to serialize batch: {0}")]
    Serialization(String),
}

/// Failures of a [`crate::queue::Storage`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::MissingToken.to_string(),
            "Invalid configuration: a source token is required"
        );
        let error = ConfigError::InvalidIngestionUri {
            uri: "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration: ingestion URI 'not a url' is not a valid URL: relative URL without a base"
        );
    }

    #[test]
    fn test_delivery_error_display() {
        let error = DeliveryError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: "bad token".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "ingestion service responded 401 Unauthorized: bad token"
        );

        let error = DeliveryError::Request {
            url: "https://in.logs.betterstack.com/".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(error.to_string().contains("connection refused"));

        let error = DeliveryError::Serialization("key must be a string".to_string());
        assert_eq!(
            error.to_string(),
            "failed to serialize batch: key must be a string"
        );
    }

    #[test]
    fn test_storage_error_debug() {
        let error = StorageError::Poisoned;
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("Poisoned"));
    }
}
