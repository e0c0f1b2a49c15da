//! Terminal error taxonomy for the API client.
//!
//! Transport-level failures inside the retry budget are handled in the
//! dispatch loop (logged, backed off, retried) and never appear here; a
//! [`ClientError`] is constructed exactly once, at the point a dispatch
//! gives up, and carries the request context needed to diagnose the
//! failure without re-deriving it.

use reqwest::StatusCode;

use crate::Method;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The method string is outside the supported set. No request is issued.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A caller-supplied header override has a name or value that is not a
    /// valid HTTP header. No request is issued.
    #[error("invalid header override: {name}")]
    InvalidHeader { name: String },

    /// The peer answered with an error status. Surfaced on first occurrence,
    /// never retried.
    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        /// Response body, capped for diagnostics.
        body: String,
    },

    /// The peer answered with a success status but the body was not valid
    /// JSON. Never retried: a malformed body will not become well-formed on
    /// a second attempt.
    #[error("failed to decode {method} {url} response body as JSON")]
    Decode {
        method: Method,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Every attempt in the budget failed at the transport level.
    #[error("{method} request to {url} failed after {attempts} attempt(s)")]
    RetriesExhausted {
        method: Method,
        url: String,
        attempts: u32,
        /// The failure from the final attempt.
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    /// Response status, when the peer produced one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Captured response body text, when the peer produced one.
    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}
