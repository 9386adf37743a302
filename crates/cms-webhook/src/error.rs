//! Intake failures.

use std::time::Duration;

use thiserror::Error;

/// Reasons a webhook request is refused.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Digest did not match the signed envelope.
    #[error("signature does not match payload")]
    InvalidSignature,

    /// Named header absent while a secret is configured.
    #[error("request is unsigned: no `{0}` header")]
    MissingSignature(String),

    /// Header present but not `sign=…, env=…, t=…`.
    #[error("unreadable signature header: {0}")]
    MalformedSignature(String),

    /// Signing time too far from the local clock.
    #[error("signed at {timestamp} ms but now is {now} ms (tolerance {tolerance:?})")]
    StaleTimestamp {
        timestamp: i64,
        now: i64,
        tolerance: Duration,
    },

    /// Signature already accepted within the replay window.
    #[error("event {event_id} was already delivered")]
    ReplayDetected { event_id: String },

    #[error("body of {size} bytes over the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl WebhookError {
    /// Authentication failed, as opposed to a readable-but-bad body.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        !matches!(
            self,
            Self::PayloadTooLarge { .. } | Self::InvalidPayload(_) | Self::Json(_)
        )
    }
}

pub type WebhookResult<T> = Result<T, WebhookError>;
