//! Delivery error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from the HTTP delivery primitive.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request cannot be sent as built, e.g. a non-HTTP URL.
    #[error("invalid delivery request: {0}")]
    InvalidRequest(String),

    /// An attempt did not finish within its timeout
    #[error("delivery attempt timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP transport failed
    #[error("delivery transport failed: {source}")]
    Transport {
        retryable: bool,
        #[source]
        source: reqwest::Error,
    },
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidRequest(_) => false,
            Self::Timeout(_) => true,
            Self::Transport { retryable, .. } => *retryable,
        }
    }

    /// Classify a transport error.
    ///
    /// Timeouts, connection failures (refused, reset, DNS) and anything
    /// without a more specific kind are retried. Request construction,
    /// redirect-policy and body-decoding failures are not.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let retryable = !(err.is_builder() || err.is_redirect() || err.is_decode());
        Self::Transport {
            retryable,
            source: err,
        }
    }
}
