//! Hygraph connector configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HygraphError, HygraphResult};

/// Configuration for the Hygraph connector.
#[derive(Clone, Serialize, Deserialize)]
pub struct HygraphConfig {
    /// Content API endpoint.
    pub content_api_url: String,

    /// Management API endpoint.
    pub management_api_url: String,

    /// Permanent auth token, used for both APIs.
    pub auth_token: String,

    /// Project ID (management API).
    pub project_id: String,

    /// Environment name
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Public URL webhooks should be delivered to. `None` disables setup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Shared secret for webhook signatures. `None` disables verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,

    /// Items requested per stream per round.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Webhook reconciliation
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Webhook intake limits
    #[serde(default)]
    pub webhook: WebhookIntakeConfig,
}

fn default_environment() -> String {
    "master".into()
}

const fn default_page_size() -> u32 {
    100
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Reconciliation retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Reads per notification before giving up on freshness
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay between reads in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

const fn default_max_attempts() -> usize {
    10
}

const fn default_delay_ms() -> u64 {
    500
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl ReconcileConfig {
    /// Delay between reads.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Webhook intake limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookIntakeConfig {
    /// Maximum accepted body size in bytes
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Allowed signing clock skew in seconds
    #[serde(default = "default_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,
}

const fn default_max_payload_size() -> usize {
    cms_webhook::DEFAULT_MAX_PAYLOAD_SIZE
}

const fn default_tolerance_secs() -> u64 {
    cms_webhook::DEFAULT_TIMESTAMP_TOLERANCE.as_secs()
}

impl Default for WebhookIntakeConfig {
    fn default() -> Self {
        Self {
            max_payload_size: default_max_payload_size(),
            timestamp_tolerance_secs: default_tolerance_secs(),
        }
    }
}

impl WebhookIntakeConfig {
    /// Handler configuration for these limits.
    #[must_use]
    pub fn to_handler_config(&self) -> cms_webhook::WebhookConfig {
        cms_webhook::WebhookConfig::new()
            .with_max_payload_size(self.max_payload_size)
            .with_timestamp_tolerance(Duration::from_secs(self.timestamp_tolerance_secs))
    }
}

impl HygraphConfig {
    /// Configuration with defaults for everything but endpoints and credentials.
    pub fn new(
        content_api_url: impl Into<String>,
        management_api_url: impl Into<String>,
        auth_token: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            content_api_url: content_api_url.into(),
            management_api_url: management_api_url.into(),
            auth_token: auth_token.into(),
            project_id: project_id.into(),
            environment: default_environment(),
            webhook_url: None,
            webhook_secret: None,
            page_size: default_page_size(),
            timeout: default_timeout(),
            reconcile: ReconcileConfig::default(),
            webhook: WebhookIntakeConfig::default(),
        }
    }

    /// Reject configurations the connector cannot run with.
    pub fn validate(&self) -> HygraphResult<()> {
        for (name, url) in [
            ("content_api_url", &self.content_api_url),
            ("management_api_url", &self.management_api_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(HygraphError::Config(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.auth_token.trim().is_empty() {
            return Err(HygraphError::Config("auth_token is required".into()));
        }
        if self.project_id.trim().is_empty() {
            return Err(HygraphError::Config("project_id is required".into()));
        }
        if self.environment.trim().is_empty() {
            return Err(HygraphError::Config("environment is required".into()));
        }
        if self.page_size == 0 {
            return Err(HygraphError::Config("page_size must be positive".into()));
        }
        if self.reconcile.max_attempts == 0 {
            return Err(HygraphError::Config(
                "reconcile.max_attempts must be positive".into(),
            ));
        }
        if let Some(url) = &self.webhook_url {
            if url.trim().is_empty() {
                return Err(HygraphError::Config("webhook_url must not be empty".into()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HygraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HygraphConfig")
            .field("content_api_url", &self.content_api_url)
            .field("management_api_url", &self.management_api_url)
            .field("auth_token", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("environment", &self.environment)
            .field("webhook_url", &self.webhook_url)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .field("reconcile", &self.reconcile)
            .field("webhook", &self.webhook)
            .finish()
    }
}
