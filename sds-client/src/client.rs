//! Retrying HTTP client shared by every external integration.
//!
//! A [`ServiceClient`] owns one connection pool, the retry policy and the
//! mapping from transport/HTTP failures to the application error taxonomy:
//!
//! | condition | error | retried |
//! |---|---|---|
//! | timeout | `UpstreamTimeout` (504) | yes |
//! | connect failure | `UpstreamServer` (502) | yes |
//! | 5xx response | `UpstreamServer` (502) | yes |
//! | non-JSON body on GET/POST/PUT/PATCH | `UpstreamServer` (502) | yes |
//! | 4xx response | `UpstreamClient` (original status) | no |
//! | service disabled | `Config` (500) | no |

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use sds_core::{AppError, Health};
use tracing::{debug, error};
use url::Url;

/// Total attempts for one logical request.
pub const TOTAL_TRIES: u32 = 5;
/// Wait before the first retry; doubles on each further retry.
pub const INITIAL_WAIT: Duration = Duration::from_millis(500);
const BACKOFF_FACTOR: u32 = 2;
/// Per-attempt read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Health probes answer fast or not at all.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Classifies a health probe body; `false` degrades the service.
pub type HealthCallback = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Reshapes an upstream error body into the message surfaced to the caller.
pub type ErrorFormatter = fn(&str) -> String;

/// Append a path under a base URL without dropping the base's own path,
/// unlike [`Url::join`] on a base that lacks a trailing slash.
pub fn join_url(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

/// Decoded response body.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

impl Payload {
    /// The JSON body, or an upstream fault when the service answered text.
    pub fn into_json(self) -> Result<serde_json::Value, AppError> {
        match self {
            Payload::Json(value) => Ok(value),
            Payload::Text(text) => Err(AppError::UpstreamServer(format!(
                "Expected a JSON response, got: '{text}'"
            ))),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Payload::Json(value) => value.to_string(),
            Payload::Text(text) => text,
        }
    }
}

/// Shared outbound HTTP client for one external service.
pub struct ServiceClient {
    name: String,
    base_url: Url,
    http: Client,
    basic_auth: Option<(String, String)>,
    default_headers: Vec<(String, String)>,
    timeout: Duration,
    health_url: Option<Url>,
    health_callback: Option<HealthCallback>,
    error_formatter: Option<ErrorFormatter>,
    enabled: bool,
}

pub struct ServiceClientBuilder {
    inner: ServiceClient,
}

impl ServiceClient {
    pub fn builder(name: impl Into<String>, base_url: Url) -> ServiceClientBuilder {
        ServiceClientBuilder {
            inner: ServiceClient {
                name: name.into(),
                base_url,
                http: Client::new(),
                basic_auth: None,
                default_headers: Vec::new(),
                timeout: DEFAULT_TIMEOUT,
                health_url: None,
                health_callback: None,
                error_formatter: None,
                enabled: true,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the base URL, keeping the base path.
    pub fn url_for(&self, path: &str) -> Url {
        join_url(&self.base_url, path)
    }

    /// Start a request against a path under the base URL.
    pub fn request(&self, method: Method, path: &str) -> ServiceRequest<'_> {
        let url = self.url_for(path);
        self.request_url(method, url)
    }

    /// Start a request against an absolute URL.
    pub fn request_url(&self, method: Method, url: Url) -> ServiceRequest<'_> {
        ServiceRequest {
            client: self,
            method,
            url,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: self.timeout,
        }
    }

    /// Probe the configured health URL.
    ///
    /// Transport failures and non-2xx answers are `Down`; a 2xx answer whose
    /// body fails the classification callback is `Degraded`; anything
    /// unexpected while reading the body is `Error`.
    pub async fn health(&self) -> Health {
        let Some(url) = &self.health_url else {
            return Health::Up;
        };
        let mut req = self.http.get(url.clone()).timeout(HEALTH_TIMEOUT);
        if let Some((user, password)) = &self.basic_auth {
            req = req.basic_auth(user, Some(password));
        }
        for (name, value) in &self.default_headers {
            req = req.header(name.as_str(), value.as_str());
        }
        match req.send().await {
            Err(e) if e.is_timeout() || e.is_connect() => {
                error!(service = %self.name, error = %e, "health probe could not reach service");
                Health::Down
            }
            Err(e) => {
                error!(service = %self.name, error = %e, "health probe failed");
                Health::Error
            }
            Ok(resp) if !resp.status().is_success() => Health::Down,
            Ok(resp) => match resp.text().await {
                Err(_) => Health::Error,
                Ok(body) => match &self.health_callback {
                    Some(callback) if !callback(&body) => Health::Degraded,
                    _ => Health::Up,
                },
            },
        }
    }
}

impl sds_core::health::HealthProbe for ServiceClient {
    fn name(&self) -> &str {
        &self.name
    }
    fn health(&self) -> Pin<Box<dyn std::future::Future<Output = Health> + Send + '_>> {
        Box::pin(ServiceClient::health(self))
    }
}

impl ServiceClientBuilder {
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.inner.basic_auth = Some((user.into(), password.into()));
        self
    }

    /// A header sent with every request of this client.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    pub fn health_url(mut self, url: Url) -> Self {
        self.inner.health_url = Some(url);
        self
    }

    pub fn health_callback(
        mut self,
        callback: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.inner.health_callback = Some(Arc::new(callback));
        self
    }

    pub fn error_formatter(mut self, formatter: ErrorFormatter) -> Self {
        self.inner.error_formatter = Some(formatter);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.inner.enabled = enabled;
        self
    }

    pub fn build(self) -> ServiceClient {
        self.inner
    }
}

/// One logical request; retried as a whole by [`send`](Self::send).
pub struct ServiceRequest<'a> {
    client: &'a ServiceClient,
    method: Method,
    url: Url,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    timeout: Duration,
}

struct AttemptError {
    error: AppError,
    retryable: bool,
}

impl AttemptError {
    fn terminal(error: AppError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
    fn retryable(error: AppError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }
}

impl ServiceRequest<'_> {
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute with retries and decode the body.
    pub async fn send(self) -> Result<Payload, AppError> {
        let name = &self.client.name;
        if !self.client.enabled {
            let reason = format!(
                "{name} is disabled, yet attempted to '{}' '{}'",
                self.method, self.url
            );
            error!("{reason}");
            return Err(AppError::Config(reason));
        }

        debug!(
            service = %name,
            method = %self.method,
            url = %self.url,
            "outbound request"
        );

        let mut delay = INITIAL_WAIT;
        let mut attempt = 1;
        loop {
            match self.execute().await {
                Ok(payload) => return Ok(payload),
                Err(failed) if !failed.retryable || attempt >= TOTAL_TRIES => {
                    return Err(failed.error)
                }
                Err(failed) => {
                    debug!(
                        service = %name,
                        attempt,
                        error = %failed.error,
                        "retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= BACKOFF_FACTOR;
                    attempt += 1;
                }
            }
        }
    }

    async fn execute(&self) -> Result<Payload, AttemptError> {
        let client = self.client;
        let name = &client.name;

        let mut req = client
            .http
            .request(self.method.clone(), self.url.clone())
            .timeout(self.timeout);
        if let Some((user, password)) = &client.basic_auth {
            req = req.basic_auth(user, Some(password));
        }
        for (header, value) in client.default_headers.iter().chain(&self.headers) {
            req = req.header(header.as_str(), value.as_str());
        }
        if !self.query.is_empty() {
            req = req.query(&self.query);
        }
        if let Some(body) = &self.body {
            req = req.json(body);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                error!(service = %name, url = %self.url, "request timed out");
                return Err(AttemptError::retryable(AppError::UpstreamTimeout(format!(
                    "{name} error: Could not reach service provider."
                ))));
            }
            Err(e) => {
                error!(service = %name, url = %self.url, error = %e, "request failed");
                return Err(AttemptError::retryable(AppError::UpstreamServer(format!(
                    "{name} error: Unexpected issue when connecting to service provider."
                ))));
            }
        };

        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            error!(
                service = %name,
                url = %self.url,
                status = status.as_u16(),
                "upstream returned an error: '{body}'"
            );
            let message = match client.error_formatter {
                Some(formatter) if !body.is_empty() => formatter(&body),
                _ => body,
            };
            let reason = format!("{name} error: {message}");
            return Err(if status.is_server_error() {
                AttemptError::retryable(AppError::UpstreamServer(reason))
            } else {
                AttemptError::terminal(AppError::UpstreamClient {
                    status,
                    message: reason,
                })
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
            .unwrap_or_default();
        let text = resp.text().await.map_err(|e| {
            AttemptError::retryable(AppError::UpstreamServer(format!(
                "{name} error: Failed to read response body: {e}"
            )))
        })?;

        if content_type.ends_with("json") {
            match serde_json::from_str(&text) {
                Ok(value) => Ok(Payload::Json(value)),
                Err(_) => Err(AttemptError::retryable(AppError::UpstreamServer(format!(
                    "{} request to {name} '{}' returned an unexpected answer: '{text}'.",
                    self.method, self.url
                )))),
            }
        } else if matches!(
            self.method,
            Method::GET | Method::POST | Method::PUT | Method::PATCH
        ) {
            // Mutating and read requests are expected to answer JSON.
            Err(AttemptError::retryable(AppError::UpstreamServer(format!(
                "{} request to {name} '{}' returned an unexpected answer: '{text}'.",
                self.method, self.url
            ))))
        } else {
            Ok(Payload::Text(text))
        }
    }
}
