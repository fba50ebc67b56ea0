//! Error types and classification for codewiki-core operations.
//!
//! Every failure in the fetch/parse/chat pipeline is expressed as an [`Error`].
//! Errors carry two pieces of metadata used by the rest of the system:
//!
//! - **Recoverability**: [`Error::is_recoverable`] separates transient upstream
//!   failures (timeouts, driver crashes, empty renders) from permanent ones
//!   (bad input, missing sections, unindexed repositories). The retry policy
//!   only retries the former.
//! - **Code**: [`Error::code`] maps every variant onto the closed [`ErrorCode`]
//!   set that crosses the tool boundary. Internal detail stays in the message.
//!
//! ```rust
//! use codewiki_core::{Error, ErrorCode};
//!
//! let err = Error::Timeout("page load exceeded 30s".to_string());
//! assert!(err.is_recoverable());
//! assert_eq!(err.code(), ErrorCode::Timeout);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for codewiki-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation (malformed repository identifier, blank query).
    ///
    /// Permanent: retrying the same input cannot succeed.
    #[error("{0}")]
    Validation(String),

    /// A bounded wait elapsed.
    ///
    /// Raised for page loads, element waits, chat answers that never appear,
    /// and the hard per-call deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The headless browser failed: missing binary, launch failure, lost
    /// connection, or a CDP command error.
    #[error("Browser driver error: {0}")]
    Driver(String),

    /// A render completed but produced no usable content.
    ///
    /// Treated as transient because single-page apps occasionally serialize
    /// before hydration finishes.
    #[error("No content: {0}")]
    NoContent(String),

    /// The target repository has no generated wiki yet.
    #[error("Not indexed: {0}")]
    NotIndexed(String),

    /// A requested section title matched nothing on the page.
    #[error("Section '{requested}' not found. Available sections: {}", available.join(", "))]
    NotFound {
        /// The title that was searched for.
        requested: String,
        /// Up to twenty titles that do exist, in document order.
        available: Vec<String>,
    },

    /// Every allowed attempt failed with a transient error.
    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// Number of attempts actually made.
        attempts: u32,
        /// The failure observed on the final attempt.
        last: Box<Error>,
    },

    /// Configuration is invalid or could not be read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else; details are logged, not surfaced.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Closed set of error codes exposed in tool responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed or missing input.
    Validation,
    /// A bounded wait or the hard deadline elapsed.
    Timeout,
    /// Headless browser failure.
    DriverError,
    /// Render produced nothing usable.
    NoContent,
    /// Repository has no wiki yet.
    NotIndexed,
    /// Requested section does not exist.
    InputNotFound,
    /// Transient failures on every attempt.
    RetryExhausted,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorCode {
    /// Wire representation, e.g. `"DRIVER_ERROR"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Timeout => "TIMEOUT",
            Self::DriverError => "DRIVER_ERROR",
            Self::NoContent => "NO_CONTENT",
            Self::NotIndexed => "NOT_INDEXED",
            Self::InputNotFound => "INPUT_NOT_FOUND",
            Self::RetryExhausted => "RETRY_EXHAUSTED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Upstream and transport failures are recoverable. Validation, lookup,
    /// indexing and configuration failures are not, and neither is an
    /// already-exhausted retry.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Driver(_) | Self::NoContent(_))
    }

    /// Static category label for structured logs.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Timeout(_) => "timeout",
            Self::Driver(_) => "driver",
            Self::NoContent(_) => "no_content",
            Self::NotIndexed(_) => "not_indexed",
            Self::NotFound { .. } => "not_found",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Map onto the closed tool-boundary code set.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Driver(_) => ErrorCode::DriverError,
            Self::NoContent(_) => ErrorCode::NoContent,
            Self::NotIndexed(_) => ErrorCode::NotIndexed,
            Self::NotFound { .. } => ErrorCode::InputNotFound,
            Self::RetryExhausted { .. } => ErrorCode::RetryExhausted,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorCode::Internal
            },
        }
    }

    /// Message safe to show to a tool caller.
    ///
    /// Internal variants and raw browser failures are collapsed to a generic
    /// sentence; their detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                "Internal error while processing the request".to_string()
            },
            Self::Driver(_) => "The headless browser failed while loading CodeWiki".to_string(),
            Self::RetryExhausted { attempts, last } => {
                format!("Gave up after {attempts} attempt(s): {}", last.public_message())
            },
            other => other.to_string(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        if matches!(err, chromiumoxide::error::CdpError::Timeout) {
            Self::Timeout("browser command did not answer in time".to_string())
        } else {
            Self::Driver(err.to_string())
        }
    }
}

/// Result type alias for codewiki-core operations.
pub type Result<T> = std::result::Result<T, Error>;
