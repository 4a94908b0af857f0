//! Generic webhook adapter.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use clypr_bridge_protocol::{DispatchJob, WebhookAuth, WebhookConfig};

use super::{ChannelAdapter, DeliveryOutcome};
use crate::delivery::{DeliveryPolicy, DeliveryRequest, HttpDelivery};
use crate::sanitize::sanitize_job;

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Reasons a webhook request could not be built.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("no webhook url on the job and no default configured")]
    MissingUrl,

    #[error("invalid webhook url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid http method {0:?}")]
    InvalidMethod(String),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Posts a sanitized projection of the job to an HTTP endpoint.
///
/// Also serves as the generic path for channels without a dedicated adapter.
pub struct WebhookAdapter {
    delivery: HttpDelivery,
    default_url: Option<String>,
    policy: DeliveryPolicy,
}

impl WebhookAdapter {
    #[must_use]
    pub fn new(delivery: HttpDelivery, default_url: Option<String>, policy: DeliveryPolicy) -> Self {
        Self {
            delivery,
            default_url,
            policy,
        }
    }

    /// Build the outbound request for `job`.
    pub fn build_request(&self, job: &DispatchJob) -> Result<DeliveryRequest, WebhookError> {
        let empty = WebhookConfig::default();
        let config = job.webhook_config().unwrap_or(&empty);

        let raw_url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or(self.default_url.as_deref())
            .ok_or(WebhookError::MissingUrl)?;
        let url = Url::parse(raw_url.trim()).map_err(|source| WebhookError::InvalidUrl {
            url: raw_url.to_string(),
            source,
        })?;

        let method = match config.method.as_deref().map(str::trim) {
            None | Some("") => Method::POST,
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| WebhookError::InvalidMethod(m.to_string()))?,
        };

        // Repeated names keep every value, in job order.
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|_| WebhookError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value.trim())
                .map_err(|_| WebhookError::InvalidHeader(name.clone()))?;
            headers.append(header_name, header_value);
        }

        if let Some(content_type) = config.content_type.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(content_type)
                .map_err(|_| WebhookError::InvalidHeader(CONTENT_TYPE.to_string()))?;
            headers.insert(CONTENT_TYPE, value);
        }
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        }

        if let Some(auth) = authorization_value(config.auth_type.as_ref()) {
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| WebhookError::InvalidHeader(AUTHORIZATION.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let body = serde_json::to_vec(&sanitize_job(job))?;

        Ok(DeliveryRequest {
            method,
            url,
            headers,
            body: Some(body),
        })
    }
}

fn authorization_value(auth: Option<&WebhookAuth>) -> Option<String> {
    match auth? {
        WebhookAuth::None => None,
        WebhookAuth::Basic { username, password } => Some(format!(
            "Basic {}",
            STANDARD.encode(format!("{username}:{password}"))
        )),
        WebhookAuth::Bearer { token } => Some(format!("Bearer {token}")),
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn attempt(&self, job: &DispatchJob) -> DeliveryOutcome {
        let request = match self.build_request(job) {
            Ok(request) => request,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Cannot build webhook request");
                return DeliveryOutcome::Failed;
            }
        };

        let policy = self.policy.with_overrides(job.retry_config.as_ref());
        match self.delivery.execute(&request, &policy).await {
            Ok(response) if response.is_success() => {
                info!(job_id = job.id, status = response.status.as_u16(), attempts = response.attempts, "Webhook delivered");
                DeliveryOutcome::Delivered
            }
            Ok(response) => {
                warn!(job_id = job.id, status = response.status.as_u16(), attempts = response.attempts, "Webhook rejected delivery");
                DeliveryOutcome::Failed
            }
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Webhook delivery failed");
                DeliveryOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use serde_json::{Value, json};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn policy() -> DeliveryPolicy {
        DeliveryPolicy {
            timeout: Duration::from_secs(2),
            retries: 2,
            backoff: Duration::from_millis(10),
        }
    }

    fn adapter(default_url: Option<String>) -> WebhookAdapter {
        WebhookAdapter::new(HttpDelivery::new(reqwest::Client::new()), default_url, policy())
    }

    fn job(config: Value) -> DispatchJob {
        serde_json::from_value(json!({
            "id": 11,
            "messageType": "alert",
            "channelType": "webhook",
            "content": {"title": "Hi", "body": "x".repeat(300)},
            "intents": [["intentType", "notify"]],
            "channelConfig": config
        }))
        .unwrap()
    }

    #[test]
    fn builds_request_with_defaults() {
        let request = adapter(None)
            .build_request(&job(json!({"webhook": {"url": "https://example.com/hook"}})))
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "https://example.com/hook");
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert!(!request.headers.contains_key(AUTHORIZATION));

        let payload: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(payload["content"]["body"].as_str().unwrap().len(), 200);
        assert_eq!(payload["intents"], json!(["intentType"]));
    }

    #[test]
    fn applies_method_headers_and_auth() {
        let request = adapter(None)
            .build_request(&job(json!({"webhook": {
                "url": "https://example.com/hook",
                "method": "put",
                "headers": {"X-Trace": "abc", "Content-Type": "application/vnd.clypr+json"},
                "authType": {"basic": {"username": "user", "password": "pass"}}
            }})))
            .unwrap();

        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.headers["x-trace"], "abc");
        assert_eq!(request.headers[CONTENT_TYPE], "application/vnd.clypr+json");
        assert_eq!(request.headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");

        let bearer = adapter(None)
            .build_request(&job(json!({"webhook": {
                "url": "https://example.com/hook",
                "headers": [["X-A", "1"]],
                "authType": {"bearer": {"token": "tok"}}
            }})))
            .unwrap();
        assert_eq!(bearer.headers[AUTHORIZATION], "Bearer tok");
        assert_eq!(bearer.headers["x-a"], "1");
    }

    #[test]
    fn repeated_headers_keep_every_value() {
        let request = adapter(None)
            .build_request(&job(json!({"webhook": {
                "url": "https://example.com/hook",
                "headers": [["X-Tag", "a"], ["x-tag", "b"], ["X-Other", "c"]]
            }})))
            .unwrap();

        let tags: Vec<_> = request.headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, ["a", "b"]);
        assert_eq!(request.headers["x-other"], "c");
    }

    #[test]
    fn falls_back_to_default_url() {
        let request = adapter(Some("https://fallback.example.com/in".into()))
            .build_request(&job(json!({"telegram": {"chatId": 5}})))
            .unwrap();
        assert_eq!(request.url.as_str(), "https://fallback.example.com/in");

        let err = adapter(None)
            .build_request(&job(json!({"telegram": {"chatId": 5}})))
            .unwrap_err();
        assert!(matches!(err, WebhookError::MissingUrl));
    }

    #[test]
    fn rejects_bad_method_and_url() {
        let err = adapter(None)
            .build_request(&job(json!({"webhook": {"url": "not a url"}})))
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidUrl { .. }));

        let err = adapter(None)
            .build_request(&job(json!({"webhook": {"url": "https://e.com", "method": "GE T"}})))
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidMethod(_)));
    }

    #[tokio::test]
    async fn delivered_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = adapter(None)
            .attempt(&job(json!({"webhook": {"url": format!("{}/hook", server.uri())}})))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn failed_after_retries_on_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let outcome = adapter(None)
            .attempt(&job(json!({"webhook": {"url": server.uri()}})))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Failed);
    }

    #[tokio::test]
    async fn missing_url_fails_without_network() {
        let outcome = adapter(None).attempt(&job(Value::Null)).await;
        assert_eq!(outcome, DeliveryOutcome::Failed);
    }
}
