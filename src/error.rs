//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror. Only
//! transport and API errors ever end a streaming session; decode noise inside
//! a stream is logged and skipped before it can become an `Error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection-level failure, already classified into a readable message.
    #[error("{0}")]
    Transport(String),

    /// Non-success HTTP status; `message` comes from the error body when it
    /// could be decoded.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    /// Classify a `reqwest` failure into a transport error a user can act on.
    pub fn from_transport(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("The request timed out: {}", error)
        } else if error.is_connect() {
            format!("No connection to the server: {}", error)
        } else if error.is_body() || error.is_decode() {
            format!("The response stream was interrupted: {}", error)
        } else if error.is_request() {
            format!("The request was cancelled or could not be sent: {}", error)
        } else {
            format!("Network error: {}", error)
        };
        Error::Transport(message)
    }

    /// HTTP status for API errors, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
