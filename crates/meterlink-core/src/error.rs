//! Shared error types across meterlink crates.

use thiserror::Error;

/// Stable error category, used by config tooling and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid configuration or malformed input.
    BadConfig,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Record could not be encoded or decoded.
    Encode,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and test assertions.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Encode => "ENCODE",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeterlinkError>;

/// Unified error type used by core and reporter.
#[derive(Debug, Error)]
pub enum MeterlinkError {
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("encode: {0}")]
    Encode(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl MeterlinkError {
    /// Map to a stable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeterlinkError::BadConfig(_) => ErrorCode::BadConfig,
            MeterlinkError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            MeterlinkError::Encode(_) => ErrorCode::Encode,
            MeterlinkError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<serde_json::Error> for MeterlinkError {
    fn from(e: serde_json::Error) -> Self {
        MeterlinkError::Encode(e.to_string())
    }
}

/// A meter's value function failed.
///
/// Contained at the meter boundary by the collector; never crosses a tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("meter read failed: {reason}")]
pub struct ReadError {
    pub reason: String,
}

impl ReadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}
