//! Webhook intake.
//!
//! Checks run in order: size limit, signature header, timestamp window,
//! digest, body decode, replay guard. Without a secret only the size limit
//! and the decode apply.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_TIMESTAMP_TOLERANCE, HmacSha256Verifier, SIGNATURE_HEADER,
    StampedSignature, WebhookError, WebhookEvent, WebhookResult,
};

/// Intake limits.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Largest accepted body in bytes.
    pub max_payload_size: usize,
    /// Allowed distance between the signing time and the local clock.
    pub timestamp_tolerance: Duration,
    /// Refuse a signature seen again within `replay_ttl`.
    pub replay_protection: bool,
    /// How long an accepted signature is remembered.
    pub replay_ttl: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            replay_protection: true,
            replay_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl WebhookConfig {
    /// Same as [`WebhookConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the body size limit in bytes.
    #[must_use]
    pub const fn with_max_payload_size(self, max_payload_size: usize) -> Self {
        Self {
            max_payload_size,
            ..self
        }
    }

    /// Override the allowed clock skew.
    #[must_use]
    pub const fn with_timestamp_tolerance(self, timestamp_tolerance: Duration) -> Self {
        Self {
            timestamp_tolerance,
            ..self
        }
    }

    /// Turn the replay guard on or off.
    #[must_use]
    pub const fn with_replay_protection(self, replay_protection: bool) -> Self {
        Self {
            replay_protection,
            ..self
        }
    }

    /// Override how long accepted signatures are remembered.
    #[must_use]
    pub const fn with_replay_ttl(self, replay_ttl: Duration) -> Self {
        Self { replay_ttl, ..self }
    }
}

/// Remembers accepted signatures for a fixed window.
#[derive(Debug)]
struct ReplayGuard {
    ttl: Duration,
    accepted: Mutex<HashMap<String, Instant>>,
}

impl ReplayGuard {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            accepted: Mutex::new(HashMap::new()),
        }
    }

    /// Record `id`, failing if it is still inside the window.
    fn admit(&self, id: &str) -> WebhookResult<()> {
        let now = Instant::now();
        let mut accepted = self.accepted.lock();
        accepted.retain(|_, at| now.duration_since(*at) < self.ttl);
        if accepted.contains_key(id) {
            return Err(WebhookError::ReplayDetected {
                event_id: id.to_string(),
            });
        }
        accepted.insert(id.to_string(), now);
        Ok(())
    }
}

/// Verifies and decodes incoming change notifications.
pub struct WebhookHandler {
    verifier: Option<HmacSha256Verifier>,
    config: WebhookConfig,
    replays: Option<ReplayGuard>,
}

impl WebhookHandler {
    /// Handler for `secret`. An absent or empty secret disables signature
    /// checks entirely.
    #[must_use]
    pub fn new(secret: Option<&str>, config: WebhookConfig) -> Self {
        let verifier = secret
            .filter(|secret| !secret.is_empty())
            .map(HmacSha256Verifier::new);
        let replays = config
            .replay_protection
            .then(|| ReplayGuard::new(config.replay_ttl));
        Self {
            verifier,
            config,
            replays,
        }
    }

    /// A secret is configured.
    #[must_use]
    pub const fn requires_signature(&self) -> bool {
        self.verifier.is_some()
    }

    /// Limits this handler was built with.
    #[must_use]
    pub const fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Run every intake check and decode the body.
    pub fn verify_and_parse(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> WebhookResult<WebhookEvent> {
        let limit = self.config.max_payload_size;
        if body.len() > limit {
            return Err(WebhookError::PayloadTooLarge {
                size: body.len(),
                limit,
            });
        }

        let Some(verifier) = &self.verifier else {
            debug!("webhook secret not set, accepting unsigned request");
            let id = format!("unsigned-{}", Utc::now().timestamp_millis());
            return Ok(WebhookEvent::new(id, serde_json::from_slice(body)?));
        };

        let stamped = header_value(headers, SIGNATURE_HEADER)
            .ok_or_else(|| WebhookError::MissingSignature(SIGNATURE_HEADER.to_string()))
            .and_then(StampedSignature::parse)?;
        self.validate_timestamp(stamped.timestamp)?;
        if let Err(err) = stamped.verify(verifier, body) {
            warn!(environment = %stamped.environment, "webhook signature rejected");
            return Err(err);
        }
        // Decode before admitting so a bad body does not burn the signature.
        let payload = serde_json::from_slice(body)?;
        if let Some(replays) = &self.replays {
            replays.admit(&stamped.sign)?;
        }

        Ok(WebhookEvent::new(stamped.sign, payload)
            .with_signature(stamped.environment, stamped.timestamp))
    }

    /// Check a signing time in unix millis against the tolerance.
    pub fn validate_timestamp(&self, timestamp: i64) -> WebhookResult<()> {
        let now = Utc::now().timestamp_millis();
        let tolerance = self.config.timestamp_tolerance;
        let skew = now.abs_diff(timestamp);
        if u128::from(skew) > tolerance.as_millis() {
            return Err(WebhookError::StaleTimestamp {
                timestamp,
                now,
                tolerance,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHandler")
            .field("verifier", &self.verifier)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(key, value)| key.eq_ignore_ascii_case(name).then_some(value.as_str()))
}
