//! Error types for directory management operations.
//!
//! Every public operation returns [`Result`]. The variant of [`Error`] identifies the stable
//! outcome code (see [`ErrorCode`]) and its `Display` output is the human-readable message.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Main error type for directory management operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A configuration file exists but could not be read
    #[error("Couldn't read config file: {0}")]
    ConfigFileUnreadable(String),

    /// A required configuration parameter was not supplied by any source
    #[error("Missing config parameter: {0}")]
    MissingConfigParameter(String),

    /// A configuration parameter was supplied but is malformed
    #[error("Invalid config parameter: {0}")]
    InvalidConfigParameter(String),

    /// Connecting or binding to the directory server failed
    #[error("Server connect failure: {0}")]
    ServerConnectFailure(String),

    /// The directory rejected an operation
    #[error("Directory operation failed: {0}")]
    DirectoryOperationFailure(String),

    /// No (or more than one) entry matched a lookup
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The entry exists but carries no value for the requested attribute
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// A distinguished name could not be parsed
    #[error("Invalid DN: {0}")]
    InvalidDn(String),
}

/// Specialized result type for directory management operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric outcome codes.
///
/// The values are kept stable so that scripts wrapping the command line tools can rely on them.
/// Serializes as the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// The operation completed.
    Success = 1,
    /// See [`Error::ConfigFileUnreadable`].
    ConfigFileUnreadable = 2,
    /// See [`Error::MissingConfigParameter`].
    MissingConfigParameter = 3,
    /// See [`Error::ServerConnectFailure`].
    ServerConnectFailure = 4,
    /// See [`Error::DirectoryOperationFailure`].
    DirectoryOperationFailure = 5,
    /// See [`Error::ObjectNotFound`].
    ObjectNotFound = 6,
    /// See [`Error::AttributeNotFound`].
    AttributeNotFound = 7,
    /// See [`Error::InvalidDn`].
    InvalidDn = 8,
    /// See [`Error::InvalidConfigParameter`].
    InvalidConfigParameter = 9,
}

impl ErrorCode {
    /// Returns the outcome code of an operation result.
    #[must_use]
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => err.code(),
        }
    }

    /// Numeric value of the code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Numeric outcome code
    pub status: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl Error {
    /// Returns the stable numeric outcome code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigFileUnreadable(_) => ErrorCode::ConfigFileUnreadable,
            Self::MissingConfigParameter(_) => ErrorCode::MissingConfigParameter,
            Self::InvalidConfigParameter(_) => ErrorCode::InvalidConfigParameter,
            Self::ServerConnectFailure(_) => ErrorCode::ServerConnectFailure,
            Self::DirectoryOperationFailure(_) => ErrorCode::DirectoryOperationFailure,
            Self::ObjectNotFound(_) => ErrorCode::ObjectNotFound,
            Self::AttributeNotFound(_) => ErrorCode::AttributeNotFound,
            Self::InvalidDn(_) => ErrorCode::InvalidDn,
        }
    }

    /// Returns the error code string for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigFileUnreadable(_) => "CONFIG_FILE_UNREADABLE",
            Self::MissingConfigParameter(_) => "MISSING_CONFIG_PARAMETER",
            Self::InvalidConfigParameter(_) => "INVALID_CONFIG_PARAMETER",
            Self::ServerConnectFailure(_) => "SERVER_CONNECT_FAILURE",
            Self::DirectoryOperationFailure(_) => "DIRECTORY_OPERATION_FAILURE",
            Self::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            Self::AttributeNotFound(_) => "ATTRIBUTE_NOT_FOUND",
            Self::InvalidDn(_) => "INVALID_DN",
        }
    }

    /// Prefixes the message with `context`, keeping the error kind.
    #[must_use]
    pub fn with_context(self, context: impl fmt::Display) -> Self {
        let wrap = |message: String| format!("{context}: {message}");
        match self {
            Self::ConfigFileUnreadable(m) => Self::ConfigFileUnreadable(wrap(m)),
            Self::MissingConfigParameter(m) => Self::MissingConfigParameter(wrap(m)),
            Self::InvalidConfigParameter(m) => Self::InvalidConfigParameter(wrap(m)),
            Self::ServerConnectFailure(m) => Self::ServerConnectFailure(wrap(m)),
            Self::DirectoryOperationFailure(m) => Self::DirectoryOperationFailure(wrap(m)),
            Self::ObjectNotFound(m) => Self::ObjectNotFound(wrap(m)),
            Self::AttributeNotFound(m) => Self::AttributeNotFound(wrap(m)),
            Self::InvalidDn(m) => Self::InvalidDn(wrap(m)),
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                status: self.code(),
                message: self.to_string(),
            },
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidConfigParameter(format!("uri: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidConfigParameter(err.to_string())
    }
}
