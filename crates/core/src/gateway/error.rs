//! Error types for the provider gateway.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when calling providers.
///
/// Every provider-side fault (bad response body, auth failure, transport
/// error) normalizes to `Provider`; exceeding the per-call bound yields
/// `Timeout`. Both are non-fatal to a turn in stages 1 and 2 - the
/// provider just drops out of that stage.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request exceeded the per-call timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Provider returned an error or an unusable response.
    #[error("{model} error: {message}")]
    Provider { model: String, message: String },

    /// Configuration error (missing API key, bad base URL).
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Create a provider-side error.
    pub fn provider(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is a timeout (for logging/metadata).
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
