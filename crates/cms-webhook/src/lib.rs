//! Change-notification intake for content connectors.
//!
//! [`WebhookHandler`] turns a raw request (headers and body) into a
//! [`WebhookEvent`] after checking the body size, the stamped HMAC signature,
//! the signing time and prior deliveries of the same signature.
//!
//! ```rust,ignore
//! use cms_webhook::{WebhookConfig, WebhookHandler};
//!
//! let handler = WebhookHandler::new(Some(secret), WebhookConfig::default());
//! let event = handler.verify_and_parse(&headers, body)?;
//! let notice: Notice = event.parse()?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod event;
mod handler;
mod signature;

use std::time::Duration;

pub use error::{WebhookError, WebhookResult};
pub use event::WebhookEvent;
pub use handler::{WebhookConfig, WebhookHandler};
pub use signature::{HmacSha256Verifier, StampedSignature};

/// Largest clock distance accepted for a signed request.
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Header carrying `sign=…, env=…, t=…`. Matched case-insensitively.
pub const SIGNATURE_HEADER: &str = "gcms-signature";
