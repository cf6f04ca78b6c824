//! Unified error types for web-query

use thiserror::Error;

/// Exit status for usage errors and for failures that have no dedicated code
pub const EXIT_FAILURE: i32 = 1;

/// Exit status when the remote browser goes away mid-run
pub const EXIT_DISCONNECTED: i32 = 2;

/// Unified error type for all web-query operations
#[derive(Error, Debug)]
pub enum WebQueryError {
    // Startup errors
    #[error("Usage error: {0}")]
    Usage(String),

    // Browser errors
    #[error("Browser connection lost")]
    Disconnected,

    #[error("Navigation to {url} failed with HTTP status {status}")]
    Navigation { status: u16, url: String },

    #[error("Browser error: {0}")]
    Browser(String),

    // Per-selector errors, isolated by the selector runner
    #[error("Selector {selector:?} failed: {message}")]
    Selector { selector: String, message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WebQueryError {
    /// Process exit status this error terminates the run with
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Disconnected => EXIT_DISCONNECTED,
            Self::Navigation { status, .. } => i32::from(*status),
            _ => EXIT_FAILURE,
        }
    }

    /// Build a selector error from any displayable cause
    pub fn selector(selector: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias using WebQueryError
pub type Result<T> = std::result::Result<T, WebQueryError>;
