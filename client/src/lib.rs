//! Outbound API client with a pooled connection and bounded retry.
//!
//! # Architecture
//!
//! The crate is organized around a single request executor:
//!
//! - [`ApiClient`] - owns one pooled [`reqwest::Client`] for its entire
//!   lifetime, created at construction and released exactly once at
//!   [`ApiClient::close`]. Construction performs no network I/O; the first
//!   connection is established lazily by the first dispatch.
//! - [`ApiRequest`] - method, relative endpoint, and optional query/body/
//!   header shaping for one dispatch.
//! - [`retry`] - the attempt loop: transport failures are retried with
//!   exponential backoff, everything else is terminal on first occurrence.
//! - [`error`] - the [`ClientError`] taxonomy surfaced to callers.
//!
//! # Dispatch Contract
//!
//! [`ApiClient::execute`] returns either the decoded JSON body of a success
//! response or a typed error - never a partial value:
//!
//! | Outcome | Retried? | Surfaced as |
//! |---------|----------|-------------|
//! | success status, valid JSON | - | `Ok(serde_json::Value)` |
//! | success status, invalid JSON | no | [`ClientError::Decode`] |
//! | error status | no | [`ClientError::Status`] |
//! | transport failure | yes, within budget | [`ClientError::RetriesExhausted`] |
//!
//! # Sharing
//!
//! The executor is intended to be constructed once at application startup and
//! shared by handle across concurrent callers; the pool is internally
//! synchronized and cloning the executor shares it rather than creating a new
//! one. Retry sequences of concurrent dispatches interleave freely.

pub mod error;
pub mod retry;

pub use error::ClientError;
pub use retry::backoff_delay;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::retry::{RetryOutcome, RetryPolicy};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ATTEMPTS: u32 = 1;
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;

// Connection pool settings (httpx-compatible defaults)
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// The closed set of methods the executor dispatches.
///
/// GET carries query parameters and no body; POST, PUT, and PATCH carry a
/// JSON body and no query parameters; DELETE carries neither. Parsing any
/// other method string fails with [`ClientError::UnsupportedMethod`] before
/// a request is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ClientError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Immutable executor configuration.
///
/// ```rust
/// use girder_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("https://api.example.com/")
///     .with_timeout(Duration::from_secs(30))
///     .with_max_attempts(3)
///     .with_auth_token("secret");
/// assert_eq!(config.base_url(), "https://api.example.com");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    timeout: Duration,
    max_attempts: u32,
    auth_token: Option<String>,
    backoff_unit: Duration,
}

impl ClientConfig {
    /// Trailing slashes are stripped from `base_url` so URL assembly can
    /// always insert exactly one separator.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            auth_token: None,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    /// Per-attempt timeout for the whole request round trip.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempt budget. Clamped to at least one attempt.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Bearer token added to default headers as `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Duration of one backoff unit. The pause before attempt k+1 is
    /// `2^(k-1)` units. Production keeps the one-second default; tests
    /// compress it.
    #[must_use]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}

// Manual Debug impl to prevent leaking bearer tokens in logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field(
                "auth_token",
                &if self.auth_token.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("backoff_unit", &self.backoff_unit)
            .finish()
    }
}

/// One outbound request.
///
/// Query parameters apply to GET dispatches, the body to POST/PUT/PATCH;
/// header overrides are merged over the defaults last and win on collision.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    params: Vec<(String, String)>,
    body: Option<Value>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    fn header_overrides(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// The request executor.
///
/// Exactly one connection pool exists per constructed executor; clones share
/// it. [`close`](Self::close) consumes the executor, so double-close and
/// dispatch-after-close are unrepresentable.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl ApiClient {
    /// Allocate the pooled HTTP client. No network I/O happens here.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let http = pooled_http(&config).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build pooled HTTP client; using library defaults");
            reqwest::Client::new()
        });
        Self { config, http }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Dispatch a request and decode the response body as JSON.
    ///
    /// Transport failures are retried with exponential backoff up to the
    /// configured attempt budget; every other failure class is terminal on
    /// first occurrence. See the crate docs for the full contract.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ClientError> {
        let method = request.method();
        let url = join_url(self.config.base_url(), request.endpoint());
        let headers = build_headers(&self.config, request.header_overrides())?;

        tracing::debug!(%method, %url, "dispatching request");

        let policy = RetryPolicy {
            max_attempts: self.config.max_attempts,
            backoff_unit: self.config.backoff_unit,
        };
        let build_request = || {
            let builder = match method {
                Method::Get => {
                    let builder = self.http.get(&url);
                    if request.params().is_empty() {
                        builder
                    } else {
                        builder.query(request.params())
                    }
                }
                Method::Post => attach_body(self.http.post(&url), request.body()),
                Method::Put => attach_body(self.http.put(&url), request.body()),
                Method::Patch => attach_body(self.http.patch(&url), request.body()),
                Method::Delete => self.http.delete(&url),
            };
            builder.headers(headers.clone())
        };

        match retry::send_with_retry(build_request, policy, method.as_str(), &url).await {
            RetryOutcome::Success { status, body } => {
                tracing::debug!(%method, %url, status = status.as_u16(), "response received");
                serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
                    method,
                    url,
                    source,
                })
            }
            RetryOutcome::Status { status, body } => {
                tracing::error!(%method, %url, status = status.as_u16(), "error status from peer");
                Err(ClientError::Status {
                    method,
                    url,
                    status,
                    body,
                })
            }
            RetryOutcome::Exhausted { attempts, source } => Err(ClientError::RetriesExhausted {
                method,
                url,
                attempts,
                source,
            }),
        }
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value, ClientError> {
        self.execute(&ApiRequest::new(Method::Get, endpoint)).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value, ClientError> {
        self.execute(&ApiRequest::new(Method::Post, endpoint).with_body(body))
            .await
    }

    pub async fn put(&self, endpoint: &str, body: Value) -> Result<Value, ClientError> {
        self.execute(&ApiRequest::new(Method::Put, endpoint).with_body(body))
            .await
    }

    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Value, ClientError> {
        self.execute(&ApiRequest::new(Method::Patch, endpoint).with_body(body))
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value, ClientError> {
        self.execute(&ApiRequest::new(Method::Delete, endpoint))
            .await
    }

    /// Release the pooled connection resource.
    ///
    /// Consumes the executor; sockets are torn down once no clone of this
    /// executor remains.
    pub fn close(self) {
        tracing::debug!(base_url = %self.config.base_url, "closing API client");
        drop(self.http);
    }

    /// Run `body` with a handle to this executor, then release it.
    ///
    /// [`close`](Self::close) runs exactly once on every exit path,
    /// including when `body` returns an error; the body's result is passed
    /// through unchanged.
    pub async fn scoped<T, E, F, Fut>(self, body: F) -> Result<T, E>
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = body(self.clone()).await;
        self.close();
        result
    }
}

fn pooled_http(config: &ClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .build()
}

/// Join the base origin and a relative endpoint with exactly one separator.
///
/// An empty endpoint targets the base origin itself; a single leading slash
/// on the endpoint is stripped before joining.
fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.is_empty() {
        base.to_string()
    } else {
        let endpoint = endpoint.strip_prefix('/').unwrap_or(endpoint);
        format!("{base}/{endpoint}")
    }
}

/// Assemble request headers: JSON content type always, bearer authorization
/// when a token is configured, caller overrides merged last (caller wins on
/// key collision).
fn build_headers(
    config: &ClientConfig,
    overrides: &[(String, String)],
) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(token) = config.auth_token() {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ClientError::InvalidHeader {
                name: AUTHORIZATION.as_str().to_string(),
            }
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    for (name, value) in overrides {
        let header_name =
            HeaderName::try_from(name.as_str()).map_err(|_| ClientError::InvalidHeader {
                name: name.clone(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader {
                name: name.clone(),
            })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn attach_body(builder: reqwest::RequestBuilder, body: Option<&Value>) -> reqwest::RequestBuilder {
    match body {
        Some(body) => builder.json(body),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiRequest, ClientConfig, ClientError, Method, build_headers, join_url};
    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

    mod url_assembly {
        use super::join_url;

        #[test]
        fn leading_slash_is_stripped_before_joining() {
            assert_eq!(
                join_url("https://api.example.com", "/v1/items"),
                "https://api.example.com/v1/items"
            );
        }

        #[test]
        fn bare_endpoint_joins_with_single_separator() {
            assert_eq!(
                join_url("https://api.example.com", "v1/items"),
                "https://api.example.com/v1/items"
            );
        }

        #[test]
        fn empty_endpoint_targets_base_origin_exactly() {
            assert_eq!(join_url("https://api.example.com", ""), "https://api.example.com");
        }
    }

    mod method_parsing {
        use super::{ClientError, Method};

        #[test]
        fn supported_methods_parse_case_insensitively() {
            assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
            assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
            assert_eq!("Put".parse::<Method>().unwrap(), Method::Put);
            assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
            assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
        }

        #[test]
        fn unsupported_method_carries_the_original_string() {
            let err = "TRACE".parse::<Method>().unwrap_err();
            match err {
                ClientError::UnsupportedMethod(m) => assert_eq!(m, "TRACE"),
                other => panic!("expected UnsupportedMethod, got {other:?}"),
            }
        }
    }

    mod config {
        use super::ClientConfig;

        #[test]
        fn trailing_slashes_are_stripped() {
            assert_eq!(
                ClientConfig::new("https://api.example.com/").base_url(),
                "https://api.example.com"
            );
            assert_eq!(
                ClientConfig::new("https://api.example.com///").base_url(),
                "https://api.example.com"
            );
        }

        #[test]
        fn attempt_budget_is_clamped_to_one() {
            let config = ClientConfig::new("https://api.example.com").with_max_attempts(0);
            assert_eq!(config.max_attempts(), 1);
        }

        #[test]
        fn debug_redacts_auth_token() {
            let config = ClientConfig::new("https://api.example.com").with_auth_token("sk-secret");
            let debug_output = format!("{config:?}");
            assert!(debug_output.contains("[REDACTED]"));
            assert!(!debug_output.contains("sk-secret"));
        }
    }

    mod header_assembly {
        use super::{AUTHORIZATION, CONTENT_TYPE, ClientConfig, ClientError, build_headers};

        fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        }

        #[test]
        fn defaults_include_json_content_type() {
            let config = ClientConfig::new("https://api.example.com");
            let headers = build_headers(&config, &[]).unwrap();
            assert_eq!(headers[CONTENT_TYPE], "application/json");
            assert!(!headers.contains_key(AUTHORIZATION));
        }

        #[test]
        fn configured_token_adds_bearer_authorization() {
            let config = ClientConfig::new("https://api.example.com").with_auth_token("tok-123");
            let headers = build_headers(&config, &[]).unwrap();
            assert_eq!(headers[AUTHORIZATION], "Bearer tok-123");
        }

        #[test]
        fn caller_override_beats_content_type_default() {
            let config = ClientConfig::new("https://api.example.com");
            let overrides = owned(&[("content-type", "application/vnd.girder+json")]);
            let headers = build_headers(&config, &overrides).unwrap();
            assert_eq!(headers[CONTENT_TYPE], "application/vnd.girder+json");
        }

        #[test]
        fn caller_override_beats_bearer_authorization() {
            let config = ClientConfig::new("https://api.example.com").with_auth_token("tok-123");
            let overrides = owned(&[("authorization", "Basic abc")]);
            let headers = build_headers(&config, &overrides).unwrap();
            assert_eq!(headers[AUTHORIZATION], "Basic abc");
            // untouched defaults remain
            assert_eq!(headers[CONTENT_TYPE], "application/json");
        }

        #[test]
        fn invalid_override_name_is_a_typed_error() {
            let config = ClientConfig::new("https://api.example.com");
            let overrides = owned(&[("not a header\n", "value")]);
            let err = build_headers(&config, &overrides).unwrap_err();
            assert!(matches!(err, ClientError::InvalidHeader { .. }));
        }
    }

    #[test]
    fn request_builder_accumulates_shape() {
        let request = ApiRequest::new(Method::Get, "/v1/items")
            .with_param("page", "2")
            .with_header("x-trace-id", "abc");
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.endpoint(), "/v1/items");
        assert_eq!(request.params().len(), 1);
        assert_eq!(request.header_overrides().len(), 1);
    }
}
