//! Error types for the metrics API client.

use thiserror::Error;

/// Failures talking to the metrics API. Every variant aborts the current refresh.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response (connect, DNS, reset).
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-2xx status.
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    /// The body did not match the expected shape.
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl BackendError {
    pub fn endpoint(&self) -> &'static str {
        match self {
            BackendError::Transport { endpoint, .. }
            | BackendError::Status { endpoint, .. }
            | BackendError::Decode { endpoint, .. } => endpoint,
        }
    }
}
