//! Error types for reconciliation.
//!
//! Every failure maps onto one [`ErrorKind`] so the caller can emit a single
//! failure report naming the kind and the message.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The failure taxonomy reported to the invoking automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Inline parameters and a full document were both supplied.
    ConflictingInput,
    /// A required field is missing or a value has the wrong shape.
    Validation,
    /// Network, TLS, timeout or authentication failure.
    ApiConnection,
    /// The server rejected a create, patch or delete.
    ApiMutation,
}

impl ErrorKind {
    /// Name used in failure reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConflictingInput => "ConflictingInputError",
            Self::Validation => "ValidationError",
            Self::ApiConnection => "ApiConnectionError",
            Self::ApiMutation => "ApiMutationError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur while reconciling a resource.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Mutually exclusive inputs were both populated.
    #[error("conflicting input: {0}")]
    ConflictingInput(String),

    /// Required field missing or a parameter of the wrong type.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Input document could not be parsed.
    #[error("invalid resource document: {0}")]
    InvalidDocument(String),

    /// Could not read a definition file.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The API could not be reached or refused the credentials.
    #[error("API connection failed: {message}")]
    ApiConnection {
        /// Error message.
        message: String,
        /// HTTP status code if the server answered.
        status: Option<u16>,
    },

    /// The API rejected a mutation.
    #[error("{operation} failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    ApiMutation {
        /// `create`, `patch` or `delete`.
        operation: &'static str,
        /// HTTP status code if the server answered.
        status: Option<u16>,
        /// Server message.
        message: String,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::ApiConnection {
            message: message.into(),
            status,
        }
    }

    /// Create a mutation error.
    pub fn mutation(operation: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ApiMutation {
            operation,
            status,
            message: message.into(),
        }
    }

    /// Get the taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConflictingInput(_) => ErrorKind::ConflictingInput,
            Error::Validation(_) | Error::InvalidDocument(_) | Error::Io { .. } => {
                ErrorKind::Validation
            }
            Error::ApiConnection { .. } => ErrorKind::ApiConnection,
            Error::ApiMutation { .. } => ErrorKind::ApiMutation,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}

/// The single failure record handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// Always `true`.
    pub failed: bool,
    /// Human-readable message.
    pub msg: String,
    /// Taxonomy name of the error.
    pub error: String,
}

impl From<&Error> for FailureReport {
    fn from(err: &Error) -> Self {
        Self {
            failed: true,
            msg: err.to_string(),
            error: err.kind().name().to_string(),
        }
    }
}
