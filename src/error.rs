//! Error types for rpc-guard

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for rpc-guard
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to callers whose RPC was rejected by authorization.
///
/// Fixed on purpose: policy names and rule names never reach the caller.
pub const UNAUTHORIZED_RPC_MESSAGE: &str = "Unauthorized RPC rejected";

/// rpc-guard errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input (bad PEM, bad regex, bad policy document)
    #[error("{0}")]
    InvalidArgument(String),

    /// Input was readable but unusable (e.g. PEM with no certificate)
    #[error("{0}")]
    FailedPrecondition(String),

    /// Named item not found (unknown audit logger factory, missing key)
    #[error("{0}")]
    NotFound(String),

    /// Peer certificate rejected during handshake
    #[error("{0}")]
    Unauthenticated(String),

    /// RPC rejected by the authorization engine
    #[error("{0}")]
    PermissionDenied(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The rejection every denied RPC is converted into.
    #[must_use]
    pub fn unauthorized_rpc() -> Self {
        Self::PermissionDenied(UNAUTHORIZED_RPC_MESSAGE.to_string())
    }

    /// Convert to an RPC status code
    #[must_use]
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::InvalidArgument(_) | Self::Json(_) => {
                StatusCode::InvalidArgument
            }
            Self::FailedPrecondition(_) => StatusCode::FailedPrecondition,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::Unauthenticated(_) => StatusCode::Unauthenticated,
            Self::PermissionDenied(_) => StatusCode::PermissionDenied,
            Self::Io(_) | Self::Internal(_) => StatusCode::Internal,
        }
    }

    /// Rebuild an error from a status code and its display message.
    ///
    /// `code()` of the result equals `code`; `Ok` has no error form and
    /// becomes `Internal`.
    #[must_use]
    pub fn from_status(code: StatusCode, message: String) -> Self {
        match code {
            StatusCode::InvalidArgument => Self::InvalidArgument(message),
            StatusCode::NotFound => Self::NotFound(message),
            StatusCode::FailedPrecondition => Self::FailedPrecondition(message),
            StatusCode::Unauthenticated => Self::Unauthenticated(message),
            StatusCode::PermissionDenied => Self::PermissionDenied(message),
            StatusCode::Ok | StatusCode::Internal => Self::Internal(message),
        }
    }
}

/// RPC status codes surfaced by this crate.
///
/// Numeric values follow the canonical RPC code table so the transport layer
/// can forward them unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    /// Success
    Ok = 0,
    /// Client supplied an invalid argument
    InvalidArgument = 3,
    /// Requested entity was not found
    NotFound = 5,
    /// Caller lacks permission
    PermissionDenied = 7,
    /// System not in a state required for the operation
    FailedPrecondition = 9,
    /// Internal invariant broken
    Internal = 13,
    /// Missing or invalid authentication credentials
    Unauthenticated = 16,
}

impl StatusCode {
    /// Canonical upper-case name (`PERMISSION_DENIED`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Internal => "INTERNAL",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
