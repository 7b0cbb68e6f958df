//! Error types for memo-client.

use memo_crypto::CryptoError;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced by store and retrieve calls.
#[derive(Debug, Error)]
pub enum MemoError {
    /// Transport failure or non-success response from the service.
    #[error(transparent)]
    Request(#[from] Box<RequestError>),

    /// Rejected before any request was made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Packing the outgoing content failed.
    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<RequestError> for MemoError {
    fn from(err: RequestError) -> Self {
        MemoError::Request(Box::new(err))
    }
}

impl MemoError {
    /// The request context, when the failure came from the service or the wire.
    pub fn request(&self) -> Option<&RequestError> {
        match self {
            MemoError::Request(err) => Some(err),
            _ => None,
        }
    }
}

/// A failed request, with everything needed to render a diagnostic.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RequestError {
    pub message: String,
    pub url: String,
    /// The outbound JSON body, or the query parameters for a GET.
    pub payload: Value,
    /// `None` when no response arrived.
    pub status: Option<u16>,
    pub response_text: Option<String>,
}

impl RequestError {
    pub(crate) fn transport(url: &str, payload: &Value, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connection failed"
        } else {
            "failed"
        };
        Self {
            message: format!("Request {kind}: {err}"),
            url: url.to_string(),
            payload: payload.clone(),
            status: None,
            response_text: None,
        }
    }

    /// Structured form for debug output.
    pub fn diagnostic(&self) -> Value {
        json!({
            "message": self.message,
            "url": self.url,
            "status_code": self.status,
            "response_text": self.response_text,
            "payload": self.payload,
        })
    }
}
