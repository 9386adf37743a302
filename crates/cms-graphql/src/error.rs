//! Client errors and the GraphQL `errors` array shape.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a request never produced an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// The per-attempt timeout elapsed.
    Timeout,
    /// No connection could be established.
    Connect,
    /// Anything else reqwest reports (TLS, body decoding, redirects).
    Other,
}

/// Network-level failure, detached from the reqwest error so it can be cloned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    /// Classification.
    pub kind: TransportKind,
    /// Rendered reqwest error.
    pub message: String,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Other
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// `line`/`column` pair pointing into the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// One step of an error `path`: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    /// Response key.
    Key(String),
    /// List position.
    Index(i64),
}

/// Entry of the response `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Message reported by the server.
    pub message: String,
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    /// Vendor-specific details, e.g. an error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// GraphQL client failure.
///
/// `Http` and `HttpStatus` are transport failures; the remaining variants mean
/// the platform answered but the exchange was rejected or unreadable.
#[derive(Debug, Clone, Error)]
pub enum GraphqlClientError {
    /// No HTTP response.
    #[error("request failed ({:?}): {}", .0.kind, .0.message)]
    Http(TransportError),

    /// Non-2xx response.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Response status.
        status: StatusCode,
        /// Body, cut to a bounded length.
        body: String,
        /// Parsed `Retry-After`.
        retry_after: Option<Duration>,
    },

    /// Request or response body was not valid JSON for the expected type.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// The server answered with a non-empty `errors` array.
    #[error("GraphQL errors: {}", summarize(.errors))]
    GraphqlErrors {
        /// Errors as reported.
        errors: Vec<GraphqlError>,
    },

    /// A configured header value is not valid on the wire.
    #[error("invalid value for header `{0}`")]
    InvalidHeader(String),

    /// Response did not have the expected shape.
    #[error("unexpected response: {message}")]
    Protocol {
        /// Details.
        message: String,
    },
}

fn summarize(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|err| err.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<reqwest::Error> for GraphqlClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.into())
    }
}

impl From<serde_json::Error> for GraphqlClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl GraphqlClientError {
    /// [`Self::Protocol`] from a message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Timeouts, connect failures, 5xx and 429 may succeed on another try.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(transport) => transport.kind != TransportKind::Other,
            Self::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Json(_)
            | Self::GraphqlErrors { .. }
            | Self::InvalidHeader(_)
            | Self::Protocol { .. } => false,
        }
    }

    /// Returns `true` for network and HTTP status failures.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::HttpStatus { .. })
    }

    /// Server-provided retry hint, when present.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
