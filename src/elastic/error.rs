//! Elasticsearch transport errors

use thiserror::Error;

/// Errors raised by cluster operations.
///
/// Fatal at startup (connection bootstrap, template load); transient and
/// retryable during flushes and rollover attempts.
#[derive(Error, Debug)]
pub enum EsError {
    #[error("Elasticsearch unavailable")]
    Unavailable,

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    Parse(String),

    #[error("TLS material could not be loaded: {0}")]
    Tls(String),
}

impl EsError {
    /// Map a reqwest failure onto the taxonomy.
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EsError::Timeout
        } else if e.is_connect() {
            EsError::Unavailable
        } else {
            EsError::Request(e)
        }
    }
}
