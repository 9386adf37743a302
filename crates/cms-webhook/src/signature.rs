//! Webhook signature verification.
//!
//! Hygraph signs a JSON envelope rather than the raw body:
//! `{"Body":"<raw body>","EnvironmentName":"<env>","TimeStamp":<unix millis>}`.
//! The base64 HMAC-SHA256 of that envelope travels in the `gcms-signature`
//! header as `sign=<b64>, env=<env>, t=<millis>`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::{WebhookError, WebhookResult};

type HmacSha256 = Hmac<Sha256>;

/// Shared-secret HMAC-SHA256 with standard padded base64 digests.
#[derive(Clone)]
pub struct HmacSha256Verifier {
    secret: Vec<u8>,
}

impl HmacSha256Verifier {
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, message: &[u8]) -> WebhookResult<HmacSha256> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(message);
        Ok(mac)
    }

    /// Base64 digest of `message`.
    pub fn compute(&self, message: &[u8]) -> WebhookResult<String> {
        Ok(STANDARD.encode(self.mac(message)?.finalize().into_bytes()))
    }

    /// Compare `signature` (base64) with the digest of `message`.
    pub fn verify(&self, message: &[u8], signature: &str) -> WebhookResult<()> {
        let expected = self.compute(message)?;
        if constant_time_eq(expected.as_bytes(), signature.trim().as_bytes()) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }
}

impl std::fmt::Debug for HmacSha256Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256Verifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Parsed `gcms-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedSignature {
    /// Base64 signature.
    pub sign: String,
    /// Environment name that was signed.
    pub environment: String,
    /// Signing time, unix millis.
    pub timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SignedEnvelope<'a> {
    body: &'a str,
    environment_name: &'a str,
    time_stamp: i64,
}

impl StampedSignature {
    /// Parse `sign=<b64>, env=<env>, t=<millis>`.
    pub fn parse(header: &str) -> WebhookResult<Self> {
        let mut sign = None;
        let mut environment = None;
        let mut timestamp = None;

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                "sign" => sign = Some(value.trim().to_string()),
                "env" => environment = Some(value.trim().to_string()),
                "t" => timestamp = value.trim().parse::<i64>().ok(),
                _ => {}
            }
        }

        match (sign, environment, timestamp) {
            (Some(sign), Some(environment), Some(timestamp)) if !sign.is_empty() => Ok(Self {
                sign,
                environment,
                timestamp,
            }),
            _ => Err(WebhookError::MalformedSignature(
                "expected sign=<b64>, env=<env>, t=<millis>".into(),
            )),
        }
    }

    /// Envelope text that was signed for `body`.
    pub fn signed_message(&self, body: &[u8]) -> WebhookResult<String> {
        let body = std::str::from_utf8(body)
            .map_err(|err| WebhookError::InvalidPayload(format!("body is not UTF-8: {err}")))?;
        let envelope = SignedEnvelope {
            body,
            environment_name: &self.environment,
            time_stamp: self.timestamp,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Verify this signature for `body`.
    pub fn verify(&self, verifier: &HmacSha256Verifier, body: &[u8]) -> WebhookResult<()> {
        let message = self.signed_message(body)?;
        verifier.verify(message.as_bytes(), &self.sign)
    }

    /// Sign `body` and build the header value.
    pub fn sign(
        verifier: &HmacSha256Verifier,
        body: &[u8],
        environment: impl Into<String>,
        timestamp: i64,
    ) -> WebhookResult<Self> {
        let mut stamped = Self {
            sign: String::new(),
            environment: environment.into(),
            timestamp,
        };
        let message = stamped.signed_message(body)?;
        stamped.sign = verifier.compute(message.as_bytes())?;
        Ok(stamped)
    }

    /// Header value.
    #[must_use]
    pub fn to_header(&self) -> String {
        format!(
            "sign={}, env={}, t={}",
            self.sign, self.environment, self.timestamp
        )
    }
}

/// Comparison whose timing depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
