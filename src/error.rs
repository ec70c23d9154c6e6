//! Error handling for the Drink-Off client

use std::fmt;
use thiserror::Error;

/// PostgREST code for "the single-object read matched no rows"
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Unified error type for the Drink-Off client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The backend rejected a request
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Backend error code, e.g. `PGRST116` or `23505`
        code: Option<String>,
        /// Human-readable message from the backend
        message: String,
    },

    /// Authentication errors
    #[error("{0}")]
    Auth(String),

    /// Storage errors
    #[error("{0}")]
    Storage(String),

    /// Edge Function errors
    #[error("{0}")]
    Function(String),

    /// Realtime subscription errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Local input checks that fail before any remote call
    #[error("{0}")]
    Validation(String),

    /// A remote call succeeded but its result breaks an invariant
    #[error("{0}")]
    Inconsistent(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new storage error
    pub fn storage<T: fmt::Display>(msg: T) -> Self {
        Error::Storage(msg.to_string())
    }

    /// Create a new function error
    pub fn function<T: fmt::Display>(msg: T) -> Self {
        Error::Function(msg.to_string())
    }

    /// Create a new realtime error
    pub fn realtime<T: fmt::Display>(msg: T) -> Self {
        Error::Realtime(msg.to_string())
    }

    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new inconsistency error
    pub fn inconsistent<T: fmt::Display>(msg: T) -> Self {
        Error::Inconsistent(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Whether this is the backend's "no matching rows" answer to a single-object read.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Error::Api { code: Some(code), .. } if code == NO_ROWS_CODE)
    }

    /// The backend error code, if the backend sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Collapse the error into the one line shown next to the control that triggered it.
    pub fn user_message(&self) -> String {
        match self {
            Error::Http(e) if e.is_connect() || e.is_timeout() => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            Error::Http(_) | Error::Url(_) | Error::Realtime(_) => {
                "Something went wrong talking to the server.".to_string()
            }
            Error::Json(_) => "The server sent a response we could not read.".to_string(),
            Error::Config(msg) => format!("The app is misconfigured: {}", msg),
            Error::Api { message, .. } if message.is_empty() => {
                "The server rejected the request.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rows_is_detected_by_code() {
        let err = Error::Api {
            status: 406,
            code: Some(NO_ROWS_CODE.to_string()),
            message: "JSON object requested, multiple (or no) rows returned".to_string(),
        };
        assert!(err.is_no_rows());
        assert_eq!(err.code(), Some("PGRST116"));

        let other = Error::Api {
            status: 409,
            code: Some("23505".to_string()),
            message: "duplicate key value violates unique constraint".to_string(),
        };
        assert!(!other.is_no_rows());
    }

    #[test]
    fn user_message_keeps_backend_text() {
        let err = Error::Api {
            status: 409,
            code: Some("23505".to_string()),
            message: "duplicate key value violates unique constraint".to_string(),
        };
        assert_eq!(
            err.user_message(),
            "duplicate key value violates unique constraint"
        );
        assert_eq!(
            Error::validation("Username must be 2-24 characters.").user_message(),
            "Username must be 2-24 characters."
        );
    }

    #[test]
    fn user_message_hides_decoding_details() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let msg = Error::from(json_err).user_message();
        assert!(!msg.contains("EOF"));
    }
}
