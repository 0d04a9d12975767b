//! # error
//!
//! Centralised error type for the gateways, the engine and the monitor API.
//!
//! Gateway calls return `Result<_, TraderError>`.  The control loop only cares
//! about one question, "is this worth retrying?", which [`TraderError::is_transient`]
//! answers.  Axum's `IntoResponse` impl turns the same type into a JSON error
//! body for the monitor endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraderError {
    /// The request never reached the remote service.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote service did not answer within the call budget.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote service answered with a non-success HTTP status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The brokerage refused an order (insufficient funds, bad symbol, market closed…).
    #[error("Order rejected for {symbol}: {reason}")]
    Rejected { symbol: String, reason: String },

    /// A response body could not be interpreted.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The requested resource is not tracked.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Start-up configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TraderError>;

impl TraderError {
    /// `true` for failures that are expected to clear on their own:
    /// network drops, timeouts, HTTP 5xx and rate limiting (429).
    pub fn is_transient(&self) -> bool {
        match self {
            TraderError::Network(_) | TraderError::Timeout(_) => true,
            TraderError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TraderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TraderError::Timeout(err.to_string())
        } else if err.is_decode() {
            TraderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            TraderError::Api { status: status.as_u16(), message: err.to_string() }
        } else {
            TraderError::Network(err.to_string())
        }
    }
}

impl IntoResponse for TraderError {
    fn into_response(self) -> Response {
        let status = match &self {
            TraderError::NotFound(_) => StatusCode::NOT_FOUND,
            TraderError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TraderError::Network(_)
            | TraderError::Timeout(_)
            | TraderError::Api { .. }
            | TraderError::Rejected { .. }
            | TraderError::Malformed(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "ok":    false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
