//! Retrieval errors and the message-only failure kept in the cache.

use thiserror::Error;

use crate::http::StatusCode;
use crate::transport::TransportError;

/// Why a retrieval failed.
///
/// Only the [`Display`](std::fmt::Display) text of a `FetchError` survives in
/// the cache; it is converted into a [`FetchFailure`] on settlement.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed with status {0}")]
    Status(StatusCode),

    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A failed retrieval as the cache records it: a human-readable message and
/// nothing else.
///
/// Failures rebuilt from a transferred snapshot are indistinguishable from
/// the ones recorded by the process that performed the retrieval.
///
/// # Examples
///
/// ```
/// use prefetch::FetchFailure;
///
/// let failure = FetchFailure::new("request failed with status 503");
/// assert_eq!(failure.message(), "request failed with status 503");
/// assert_eq!(failure.to_string(), "request failed with status 503");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchFailure {
    message: String,
}

impl FetchFailure {
    /// Wraps a message as a failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Consumes the failure, returning its message.
    pub fn into_message(self) -> String {
        self.message
    }
}

impl From<FetchError> for FetchFailure {
    fn from(err: FetchError) -> Self {
        Self::new(err.to_string())
    }
}
