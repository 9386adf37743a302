//! Hygraph-specific error types.

use cms_graphql::GraphqlClientError;
use cms_webhook::WebhookError;
use thiserror::Error;

/// Hygraph connector errors.
#[derive(Error, Debug)]
pub enum HygraphError {
    /// Read or transport failure talking to a Hygraph API.
    #[error(transparent)]
    Graphql(#[from] GraphqlClientError),

    /// A write was rejected.
    #[error("{operation} failed: {message}")]
    Mutation {
        /// Mutation field, e.g. `updatePost`.
        operation: String,
        /// Reason reported by the platform or the transport.
        message: String,
    },

    /// Webhook intake rejected the request.
    #[error("webhook rejected: {0}")]
    Webhook(#[from] WebhookError),

    /// Webhook body was not a change notification.
    #[error("invalid change notification: {0}")]
    Notification(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Type name not present in the content model.
    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

impl HygraphError {
    /// Build a mutation failure from any displayable cause.
    pub fn mutation(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Mutation {
            operation: operation.into(),
            message: cause.to_string(),
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Graphql(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Result type for Hygraph operations.
pub type HygraphResult<T> = Result<T, HygraphError>;
