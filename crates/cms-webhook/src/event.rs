//! Verified webhook events.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WebhookResult;

/// A webhook that passed intake checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID used for replay detection (the signature when signed).
    pub id: String,

    /// When the handler accepted the event.
    pub received_at: DateTime<Utc>,

    /// Environment named in the signature, if signed.
    pub environment: Option<String>,

    /// Signing time, if signed.
    pub signed_at: Option<DateTime<Utc>>,

    /// Raw payload.
    pub payload: Value,
}

impl WebhookEvent {
    /// Create a new unsigned event.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            received_at: Utc::now(),
            environment: None,
            signed_at: None,
            payload,
        }
    }

    /// Attach signature details.
    #[must_use]
    pub fn with_signature(mut self, environment: impl Into<String>, signed_at_ms: i64) -> Self {
        self.environment = Some(environment.into());
        self.signed_at = DateTime::from_timestamp_millis(signed_at_ms);
        self
    }

    /// Decode the payload into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> WebhookResult<T> {
        Ok(T::deserialize(&self.payload)?)
    }

    /// Value at a dotted path such as `data.__typename`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.payload;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// String at a dotted path.
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path)?.as_str()
    }
}
