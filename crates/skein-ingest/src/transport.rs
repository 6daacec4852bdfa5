// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-attempt transports for ingestion batches.
//!
//! A [`Transport`] sends one [`IngestionRequest`] and classifies the
//! outcome. Retrying, circuit breaking and hooks live one layer up in
//! [`crate::delivery`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use skein_core::{IngestionRequest, IngestionResponse, SkeinError};
use skein_hooks::RequestContext;
use tracing::debug;

/// Path of the batch ingestion endpoint, relative to the base URL.
pub const INGESTION_PATH: &str = "/api/public/ingestion";

/// A successfully parsed transport response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: IngestionResponse,
}

/// Sends one ingestion request. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &IngestionRequest,
        ctx: &RequestContext,
    ) -> Result<TransportResponse, SkeinError>;
}

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub public_key: String,
    pub secret_key: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            public_key: String::new(),
            secret_key: String::new(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("skein/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl From<&skein_config::model::ClientConfig> for HttpTransportConfig {
    fn from(config: &skein_config::model::ClientConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            public_key: config.public_key.clone(),
            secret_key: config.secret_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            ..Self::default()
        }
    }
}

/// JSON-over-HTTP transport with basic authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    public_key: String,
    secret_key: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, SkeinError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SkeinError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{INGESTION_PATH}", config.base_url.trim_end_matches('/')),
            public_key: config.public_key,
            secret_key: config.secret_key,
            timeout: config.timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, e: reqwest::Error) -> SkeinError {
        if e.is_timeout() {
            SkeinError::Timeout {
                duration: self.timeout,
            }
        } else {
            SkeinError::network(format!("HTTP request failed: {e}"))
        }
    }

    fn extra_headers(ctx: &RequestContext) -> Result<HeaderMap, SkeinError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &ctx.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                SkeinError::invalid_field("header", format!("invalid header name `{name}`: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                SkeinError::invalid_field("header", format!("invalid value for `{name}`: {e}"))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &IngestionRequest,
        ctx: &RequestContext,
    ) -> Result<TransportResponse, SkeinError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .headers(Self::extra_headers(ctx)?)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        debug!(status, batch_id = %ctx.batch_id, attempt = ctx.attempt, "ingestion response received");

        if status == 200 || status == 207 {
            let text = response.text().await.map_err(|e| self.classify(e))?;
            let body = serde_json::from_str::<IngestionResponse>(&text).map_err(|e| {
                SkeinError::Internal(format!("failed to parse ingestion response: {e}"))
            })?;
            return Ok(TransportResponse { status, body });
        }

        let text = response.text().await.unwrap_or_default();
        Err(SkeinError::api(status, error_message(&text, status)))
    }
}

/// Extracts a human-readable message from an error body.
fn error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Object(obj)) => {
                    if let Some(serde_json::Value::String(s)) = obj.get("message") {
                        return s.clone();
                    }
                }
                _ => {}
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.chars().take(512).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{Batch, BatchId, Event};
    use wiremock::matchers::{basic_auth, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(base_url: &str) -> HttpTransport {
        HttpTransport::new(HttpTransportConfig {
            base_url: base_url.to_string(),
            public_key: "pk-test".into(),
            secret_key: "sk-test".into(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    fn request() -> (IngestionRequest, RequestContext) {
        let batch = Batch::new(vec![
            Event::trace(serde_json::json!({"name": "a"})),
            Event::span(serde_json::json!({"name": "b"})),
        ]);
        let ctx = RequestContext::new(BatchId::new(), 1, batch.len());
        (IngestionRequest::from(&batch), ctx)
    }

    #[tokio::test]
    async fn posts_batch_with_auth_and_hook_headers() {
        let server = MockServer::start().await;
        let (req, mut ctx) = request();
        ctx.set_header("x-skein-attempt", "1");

        let body = serde_json::json!({
            "successes": req.events.iter().map(|e| serde_json::json!({"id": e.id().as_str(), "status": 201})).collect::<Vec<_>>(),
            "errors": []
        });

        Mock::given(method("POST"))
            .and(path(INGESTION_PATH))
            .and(basic_auth("pk-test", "sk-test"))
            .and(header("x-skein-attempt", "1"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let resp = transport(&server.uri()).send(&req, &ctx).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.successes.len(), 2);
        assert!(!resp.body.has_errors());
    }

    #[tokio::test]
    async fn multi_status_is_parsed_as_partial() {
        let server = MockServer::start().await;
        let (req, ctx) = request();
        let ids: Vec<_> = req.events.iter().map(|e| e.id().as_str().to_string()).collect();

        let body = serde_json::json!({
            "successes": [{"id": ids[0], "status": 201}],
            "errors": [{"id": ids[1], "status": 400, "message": "invalid span"}]
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(207).set_body_json(&body))
            .mount(&server)
            .await;

        let resp = transport(&server.uri()).send(&req, &ctx).await.unwrap();
        assert_eq!(resp.status, 207);
        assert!(resp.body.is_partial());
        assert_eq!(resp.body.errors[0].message.as_deref(), Some("invalid span"));
    }

    #[tokio::test]
    async fn error_status_becomes_api_error_with_message() {
        let server = MockServer::start().await;
        let (req, ctx) = request();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"message": "invalid credentials"})),
            )
            .mount(&server)
            .await;

        let err = transport(&server.uri()).send(&req, &ctx).await.unwrap_err();
        match err {
            SkeinError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid credentials");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let (req, ctx) = request();
        // Port 9 (discard) is expected to refuse connections.
        let err = transport("http://127.0.0.1:9").send(&req, &ctx).await.unwrap_err();
        assert!(err.is_retryable(), "got: {err:?}");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let t = transport("https://collector.example.com/");
        assert_eq!(t.endpoint(), "https://collector.example.com/api/public/ingestion");
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(error_message(r#"{"error":{"message":"nope"}}"#, 500), "nope");
        assert_eq!(error_message(r#"{"error":"bad"}"#, 400), "bad");
        assert_eq!(error_message("", 502), "HTTP 502");
        assert_eq!(error_message("gateway down", 502), "gateway down");
    }
}
