//! Shared error type across chanpoll crates.

use thiserror::Error;

/// Machine-readable error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input / malformed envelope.
    BadRequest,
    /// Unsupported wire version.
    UnsupportedVersion,
    /// Invalid configuration.
    InvalidConfig,
    /// Internal failure.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and events.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ChanpollError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum ChanpollError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ChanpollError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChanpollError::BadRequest(_) => ErrorCode::BadRequest,
            ChanpollError::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            ChanpollError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            ChanpollError::Internal(_) => ErrorCode::Internal,
        }
    }
}
