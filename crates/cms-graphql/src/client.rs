//! HTTP transport for GraphQL documents.
//!
//! [`GraphqlClient`] posts JSON requests to a single endpoint. Transport
//! failures are retried according to the configured [`RetryPolicy`]; GraphQL
//! errors are never retried, they are returned to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::ast::Document;
use crate::error::{GraphqlClientError, GraphqlError};
use crate::operation::{GraphqlOperation, GraphqlQuery, GraphqlRequest, GraphqlResponse};
use crate::retry::{RetryDecision, RetryPolicy};

const MAX_ERROR_BODY: usize = 4096;

#[derive(Debug, Default)]
struct RequestCounters {
    sent: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl RequestCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RequestStats {
        RequestStats {
            sent: self.sent.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Request counts since the client was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    /// Logical requests; retries are not counted here.
    pub sent: u64,
    /// Requests answered without GraphQL errors.
    pub succeeded: u64,
    /// Requests that failed in transport or returned GraphQL errors.
    pub failed: u64,
    /// Extra attempts made after a retryable failure.
    pub retried: u64,
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct GraphqlClientConfig {
    /// Name used in log fields.
    pub service_name: String,
    /// Headers sent with every request.
    pub headers: HeaderMap,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Transport retry policy.
    pub retry: RetryPolicy,
}

impl Default for GraphqlClientConfig {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            service_name: "graphql".into(),
            headers,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Builder for [`GraphqlClient`].
#[derive(Debug, Clone)]
pub struct GraphqlClientBuilder {
    endpoint: String,
    config: GraphqlClientConfig,
    rejected_header: Option<HeaderName>,
}

impl GraphqlClientBuilder {
    /// Builder for `endpoint` with default settings.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config: GraphqlClientConfig::default(),
            rejected_header: None,
        }
    }

    /// Name used in log fields.
    #[must_use]
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.config.service_name = service_name.into();
        self
    }

    /// Send `name: value` with every request.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    /// Authenticate with a bearer token. The header is marked sensitive so it
    /// never shows up in `Debug` output. A token that is not a valid header
    /// value makes [`Self::build`] fail.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl AsRef<str>) -> Self {
        match HeaderValue::from_str(&format!("Bearer {}", token.as_ref())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.with_header(AUTHORIZATION, value)
            }
            Err(_) => {
                self.rejected_header = Some(AUTHORIZATION);
                self
            }
        }
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Transport retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<GraphqlClient, GraphqlClientError> {
        if let Some(name) = self.rejected_header {
            return Err(GraphqlClientError::InvalidHeader(name.to_string()));
        }
        GraphqlClient::with_config(self.endpoint, self.config)
    }
}

/// GraphQL client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    http: reqwest::Client,
    config: GraphqlClientConfig,
    counters: Arc<RequestCounters>,
}

impl GraphqlClient {
    /// Client with default settings.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let config = GraphqlClientConfig::default();
        let http = http_client(&config).unwrap_or_default();
        Self::assemble(endpoint, http, config)
    }

    /// Client with explicit settings.
    pub fn with_config(
        endpoint: impl Into<String>,
        config: GraphqlClientConfig,
    ) -> Result<Self, GraphqlClientError> {
        let http = http_client(&config)?;
        Ok(Self::assemble(endpoint.into(), http, config))
    }

    fn assemble(endpoint: String, http: reqwest::Client, config: GraphqlClientConfig) -> Self {
        Self {
            endpoint,
            http,
            config,
            counters: Arc::default(),
        }
    }

    /// Endpoint this client posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request counts so far.
    #[must_use]
    pub fn stats(&self) -> RequestStats {
        self.counters.snapshot()
    }

    /// Execute a static operation and return the full response.
    pub async fn execute<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
    ) -> Result<GraphqlResponse<O::ResponseData>, GraphqlClientError> {
        let request = GraphqlRequest::new(GraphqlQuery::from_static(O::QUERY), variables)
            .with_operation_name(O::OPERATION_NAME);
        self.execute_request(request, O::is_idempotent()).await
    }

    /// Execute a static operation; GraphQL errors become an `Err`.
    pub async fn execute_strict<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
    ) -> Result<O::ResponseData, GraphqlClientError> {
        into_data(self.execute::<O>(variables).await?)
    }

    /// Render and execute a document built from the query AST.
    pub async fn execute_document(
        &self,
        document: &Document,
        idempotent: bool,
    ) -> Result<GraphqlResponse<serde_json::Value>, GraphqlClientError> {
        self.execute_request(GraphqlRequest::from_document(document), idempotent)
            .await
    }

    /// Render and execute a document; GraphQL errors become an `Err`.
    pub async fn execute_document_strict(
        &self,
        document: &Document,
        idempotent: bool,
    ) -> Result<serde_json::Value, GraphqlClientError> {
        into_data(self.execute_document(document, idempotent).await?)
    }

    /// Render `document` and send it with `variables` for the variables it
    /// declares; GraphQL errors become an `Err`.
    pub async fn execute_document_with(
        &self,
        document: &Document,
        variables: serde_json::Value,
        idempotent: bool,
    ) -> Result<serde_json::Value, GraphqlClientError> {
        let request = GraphqlRequest::from_document(document).with_variables(variables);
        into_data(self.execute_request(request, idempotent).await?)
    }

    /// Execute any request.
    pub async fn execute_request<V, R>(
        &self,
        request: GraphqlRequest<V>,
        idempotent: bool,
    ) -> Result<GraphqlResponse<R>, GraphqlClientError>
    where
        V: Serialize,
        R: DeserializeOwned,
    {
        RequestCounters::bump(&self.counters.sent);

        let outcome = self.round_trip(&request, idempotent).await;
        match &outcome {
            Ok(response) if response.errors.is_empty() => {
                RequestCounters::bump(&self.counters.succeeded);
            }
            _ => RequestCounters::bump(&self.counters.failed),
        }
        outcome
    }

    /// Wrap GraphQL errors in a client error.
    #[allow(clippy::missing_const_for_fn)]
    pub fn graphql_errors(errors: Vec<GraphqlError>) -> GraphqlClientError {
        GraphqlClientError::GraphqlErrors { errors }
    }

    async fn round_trip<V, R>(
        &self,
        request: &GraphqlRequest<V>,
        idempotent: bool,
    ) -> Result<GraphqlResponse<R>, GraphqlClientError>
    where
        V: Serialize,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let bytes = self.post(body, idempotent).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[instrument(skip_all, fields(service = %self.config.service_name, idempotent = idempotent))]
    async fn post(&self, body: Vec<u8>, idempotent: bool) -> Result<Vec<u8>, GraphqlClientError> {
        let mut attempt = 1;
        loop {
            let err = match self.attempt(&body).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => err,
            };

            let RetryDecision::RetryAfter(delay) =
                self.config.retry.decide(&err, attempt, idempotent)
            else {
                return Err(err);
            };

            RequestCounters::bump(&self.counters.retried);
            debug!(attempt, ?delay, error = %err, "retrying request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, body: &[u8]) -> Result<Vec<u8>, GraphqlClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let bytes = response.bytes().await?;

        if status.is_success() {
            Ok(bytes.to_vec())
        } else {
            Err(GraphqlClientError::HttpStatus {
                status,
                body: truncate_body(&bytes),
                retry_after,
            })
        }
    }
}

fn http_client(config: &GraphqlClientConfig) -> Result<reqwest::Client, GraphqlClientError> {
    Ok(reqwest::Client::builder()
        .default_headers(config.headers.clone())
        .timeout(config.timeout)
        .user_agent(concat!("cms-graphql/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn into_data<T>(response: GraphqlResponse<T>) -> Result<T, GraphqlClientError> {
    if !response.errors.is_empty() {
        return Err(GraphqlClient::graphql_errors(response.errors));
    }
    response
        .data
        .ok_or_else(|| GraphqlClientError::protocol("missing GraphQL data"))
}

/// `Retry-After` in delay-seconds form. HTTP dates are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

fn truncate_body(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_ERROR_BODY {
        return text.into_owned();
    }
    let cut = (0..=MAX_ERROR_BODY)
        .rev()
        .find(|&index| text.is_char_boundary(index))
        .unwrap_or(0);
    format!("{}…", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_parses_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 3 "));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(3000);
        let truncated = truncate_body(body.as_bytes());
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= MAX_ERROR_BODY + '…'.len_utf8());

        assert_eq!(truncate_body(b"short"), "short");
    }

    #[test]
    fn bearer_token_header_is_sensitive() {
        let builder = GraphqlClientBuilder::new("http://localhost").with_bearer_token("secret");
        let header = builder.config.headers.get(AUTHORIZATION).unwrap();
        assert!(header.is_sensitive());
        assert_eq!(header.to_str().unwrap(), "Bearer secret");
        assert!(!format!("{builder:?}").contains("secret"));
    }

    #[test]
    fn unusable_bearer_token_fails_build() {
        let err = GraphqlClientBuilder::new("http://localhost")
            .with_bearer_token("line\nbreak")
            .build()
            .unwrap_err();

        assert!(matches!(err, GraphqlClientError::InvalidHeader(ref name) if name == "authorization"));
        assert!(!err.to_string().contains("break"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn strict_conversion_rejects_errors_and_missing_data() {
        let missing: GraphqlResponse<serde_json::Value> = GraphqlResponse {
            data: None,
            errors: Vec::new(),
            extensions: None,
        };
        assert!(matches!(
            into_data(missing),
            Err(GraphqlClientError::Protocol { .. })
        ));

        let failed: GraphqlResponse<serde_json::Value> = serde_json::from_value(
            serde_json::json!({ "data": null, "errors": [{ "message": "nope" }] }),
        )
        .unwrap();
        assert!(matches!(
            into_data(failed),
            Err(GraphqlClientError::GraphqlErrors { .. })
        ));
    }
}
