//! Error types for price provider calls

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while fetching a quote from the provider
///
/// Always scoped to a single instrument; the pipeline records them and moves on.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, timeout, or a non-success HTTP status
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// Body was not JSON or did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// No usable `result` payload or `index_price` value
    #[error("Missing field: {0}")]
    MissingField(String),
}

/// Coarse classification of a [`ProviderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    Unreachable,
    MalformedResponse,
    MissingField,
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Unreachable(_) => ProviderErrorKind::Unreachable,
            ProviderError::MalformedResponse(_) => ProviderErrorKind::MalformedResponse,
            ProviderError::MissingField(_) => ProviderErrorKind::MissingField,
        }
    }

    /// Build an error of the given kind with a message
    #[cfg(test)]
    pub(crate) fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ProviderErrorKind::Unreachable => ProviderError::Unreachable(message),
            ProviderErrorKind::MalformedResponse => ProviderError::MalformedResponse(message),
            ProviderErrorKind::MissingField => ProviderError::MissingField(message),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Unreachable(format!("request timeout: {}", e))
        } else if e.is_connect() {
            ProviderError::Unreachable(format!("connection failed: {}", e))
        } else if e.is_decode() {
            ProviderError::MalformedResponse(format!("failed to decode body: {}", e))
        } else {
            ProviderError::Unreachable(format!("request failed: {}", e))
        }
    }
}
