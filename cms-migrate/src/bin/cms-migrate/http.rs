//! HTTP implementation of the management API client.
//!
//! Uses `ureq` (sync) inside `tokio::task::spawn_blocking`. Rate limiting (429),
//! service unavailable (503) and timeouts are retried with exponential backoff.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cms_migrate::{ApiError, ApiRequest, HttpMethod, ManagementClient, TransportDetail, ValidationIssue};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use ureq::http::Response;
use ureq::typestate::WithBody;
use ureq::{Body, RequestBuilder};
use url::Url;

use crate::context::RemoteSettings;

const SOURCE_HEADER: &str = "X-KC-SOURCE";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Error payload returned by the management API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    validation_errors: Vec<ValidationIssue>,
}

enum Attempt {
    Retry(ApiError),
    Fail(ApiError),
}

#[derive(Clone)]
pub struct HttpManagementClient {
    agent: ureq::Agent,
    base_url: Url,
    environment_id: String,
    api_key: String,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpManagementClient {
    pub fn new(settings: &RemoteSettings, environment_id: &str, api_key: &str) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)
            .with_context(|| format!("Invalid management API base URL: {}", settings.base_url))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();

        Ok(Self {
            agent,
            base_url,
            environment_id: environment_id.to_string(),
            api_key: api_key.to_string(),
            max_attempts: settings.max_attempts.max(1),
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    /// `{base_url}/{environment_id}/{path}`
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            self.environment_id,
            path.trim_start_matches('/')
        )
    }

    fn send_with_retry(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let url = self.url_for(&request.path);
        let mut delay = self.backoff;

        for attempt in 1..=self.max_attempts {
            match self.send_once(request, &url) {
                Ok(value) => return Ok(value),
                Err(Attempt::Retry(err)) if attempt < self.max_attempts => {
                    warn!(
                        "{} {} failed ({}), retrying in {}ms (attempt {attempt}/{})",
                        request.method,
                        url,
                        err.message,
                        delay.as_millis(),
                        self.max_attempts
                    );
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                Err(Attempt::Retry(err)) | Err(Attempt::Fail(err)) => return Err(err),
            }
        }

        Err(ApiError::new(format!("{} {url}: no attempts were made", request.method)))
    }

    fn send_once(&self, request: &ApiRequest, url: &str) -> Result<Value, Attempt> {
        debug!("{} {url}", request.method);

        let transport = |status: Option<u16>, message: String| TransportDetail {
            method: request.method,
            url: url.to_string(),
            body: request.body.clone(),
            status,
            message,
        };

        let result = match request.method {
            HttpMethod::Get => self.authorized(self.agent.get(url)).call(),
            HttpMethod::Delete => self.authorized(self.agent.delete(url)).call(),
            HttpMethod::Post => send_body(self.authorized(self.agent.post(url)), request.body.as_ref()),
            HttpMethod::Put => send_body(self.authorized(self.agent.put(url)), request.body.as_ref()),
            HttpMethod::Patch => send_body(self.authorized(self.agent.patch(url)), request.body.as_ref()),
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let retry = matches!(err, ureq::Error::Timeout(_));
                let api = ApiError::new(err.to_string()).with_transport(transport(None, err.to_string()));
                return Err(if retry { Attempt::Retry(api) } else { Attempt::Fail(api) });
            }
        };

        let status = response.status().as_u16();
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|err| Attempt::Fail(ApiError::new(format!("cannot read response: {err}"))))?;

        if (200..300).contains(&status) {
            return parse_success(&text)
                .map_err(|err| Attempt::Fail(err.with_transport(transport(Some(status), "invalid response".into()))));
        }

        let api = decode_error(status, &text).with_transport(transport(Some(status), format!("HTTP {status}")));
        if is_retryable_status(status) {
            Err(Attempt::Retry(api))
        } else {
            Err(Attempt::Fail(api))
        }
    }
}

impl HttpManagementClient {
    fn authorized<B>(&self, builder: RequestBuilder<B>) -> RequestBuilder<B> {
        builder
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header(SOURCE_HEADER, concat!("cms-migrate;", env!("CARGO_PKG_VERSION")))
    }
}

fn send_body(builder: RequestBuilder<WithBody>, body: Option<&Value>) -> Result<Response<Body>, ureq::Error> {
    match body {
        Some(body) => builder.send_json(body),
        None => builder.send_empty(),
    }
}

#[async_trait]
impl ManagementClient for HttpManagementClient {
    async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let client = self.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || client.send_with_retry(&request))
            .await
            .map_err(|err| ApiError::new(format!("task join error: {err}")))?
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 503)
}

fn parse_success(text: &str) -> Result<Value, ApiError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|err| ApiError::new(format!("failed to parse response as JSON: {err}")))
}

fn decode_error(status: u16, text: &str) -> ApiError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let message = body
        .message
        .unwrap_or_else(|| format!("request failed with HTTP {status}"));

    let mut err = ApiError::new(message).with_validation_errors(body.validation_errors);
    if let Some(code) = body.error_code {
        err = err.with_code(code);
    }
    err
}
