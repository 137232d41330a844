// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery of serialized batches.
//!
//! Exactly one POST per call. Retrying is left to the durable queue replay,
//! and no timeout is applied: a call lasts as long as the request does.

use crate::error::DeliveryError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::future::Future;
use tracing::debug;

/// Network primitive used by the sink to ship a payload.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `payload` once, resolving when the intake has answered.
    async fn send(&self, payload: String) -> Result<(), DeliveryError>;
}

/// Sends `payload` and, once delivered, runs `on_delivered` before resolving.
///
/// The callback does not run when delivery fails.
pub async fn send_and_then<T, F, Fut>(
    transport: &T,
    payload: String,
    on_delivered: F,
) -> Result<(), DeliveryError>
where
    T: Transport + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    transport.send(payload).await?;
    on_delivered().await;
    Ok(())
}

/// reqwest-backed [`Transport`] posting to the Better Stack intake.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl DeliveryClient {
    /// Builds a client for `url`, authenticating with `token`.
    ///
    /// A token that cannot be carried in a header is sent without the
    /// `Authorization` header and will be rejected by the intake.
    #[must_use]
    pub fn new(url: impl Into<String>, token: &str) -> Self {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => debug!("BETTERSTACK | Token is not a valid header value: {e}"),
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[async_trait]
impl Transport for DeliveryClient {
    async fn send(&self, payload: String) -> Result<(), DeliveryError> {
        let bytes = payload.len();
        let resp = self
            .client
            .post(&self.url)
            .headers(self.headers().clone())
            .body(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Request {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            debug!("BETTERSTACK | Delivered {bytes} bytes, status {status}");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Status { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_headers() {
        let client = DeliveryClient::new("https://in.logs.betterstack.com", "secret");
        let headers = client.headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_invalid_token_drops_authorization() {
        let client = DeliveryClient::new("https://in.logs.betterstack.com", "bad\ntoken");
        assert!(!client.headers().contains_key(AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_send_posts_payload_with_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("Authorization", "Bearer secret")
            .match_header("Content-Type", "application/json")
            .match_body(r#"[{"message":"hi"}]"#)
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let client = DeliveryClient::new(server.url(), "secret");
        let result = client.send(r#"[{"message":"hi"}]"#.to_string()).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_non_success_is_error_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Internal Server Error")
            .expect(1)
            .create_async()
            .await;

        let client = DeliveryClient::new(server.url(), "secret");
        let result = client.send("[]".to_string()).await;

        assert_eq!(
            result,
            Err(DeliveryError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "Internal Server Error".to_string(),
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_connection_failure() {
        // Nothing listens on the discard port.
        let client = DeliveryClient::new("http://127.0.0.1:9", "secret");
        let result = client.send("[]".to_string()).await;
        assert!(matches!(result, Err(DeliveryError::Request { .. })));
    }

    #[tokio::test]
    async fn test_send_and_then_runs_callback_on_success_only() {
        let mut server = Server::new_async().await;
        let _ok = server
            .mock("POST", "/ok")
            .with_status(200)
            .create_async()
            .await;
        let _fail = server
            .mock("POST", "/fail")
            .with_status(503)
            .create_async()
            .await;

        let delivered = AtomicBool::new(false);
        let client = DeliveryClient::new(format!("{}/fail", server.url()), "secret");
        let result = send_and_then(&client, "[]".to_string(), || async {
            delivered.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(result.is_err());
        assert!(!delivered.load(Ordering::SeqCst));

        let client = DeliveryClient::new(format!("{}/ok", server.url()), "secret");
        let result = send_and_then(&client, "[]".to_string(), || async {
            delivered.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(result.is_ok());
        assert!(delivered.load(Ordering::SeqCst));
    }
}
