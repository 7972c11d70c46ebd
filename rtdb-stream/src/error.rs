//! Error types for the rtdb-stream crate.
//!
//! Vendor errors reach consumers only after classification into one of the
//! [`ErrorKind`]s below. Classification is a pure mapping; retrying is left
//! to the consumer, who may simply resubscribe.

use crate::types::{ErrorCode, VendorError};

/// Closed set of error categories surfaced to stream consumers.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidToken,
    ExpiredToken,
    NetworkError,
    PermissionDenied,
    OperationFailed,
    AuthProviderDisabled,
    /// Any code without a dedicated kind
    General,
}

/// Terminal error delivered on a stream.
///
/// Each variant carries the vendor's message unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The credential presented to the service is malformed or revoked
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The credential presented to the service has expired
    #[error("Expired token: {0}")]
    ExpiredToken(String),

    /// The operation could not reach the service
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Access rules refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The service failed the operation
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The authentication provider is disabled for this project
    #[error("Auth provider disabled: {0}")]
    AuthProviderDisabled(String),

    /// Fallback for every other vendor code
    #[error("{0}")]
    General(String),
}

impl StreamError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::InvalidToken(_) => ErrorKind::InvalidToken,
            StreamError::ExpiredToken(_) => ErrorKind::ExpiredToken,
            StreamError::NetworkError(_) => ErrorKind::NetworkError,
            StreamError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StreamError::OperationFailed(_) => ErrorKind::OperationFailed,
            StreamError::AuthProviderDisabled(_) => ErrorKind::AuthProviderDisabled,
            StreamError::General(_) => ErrorKind::General,
        }
    }

    /// The vendor-supplied message.
    pub fn message(&self) -> &str {
        match self {
            StreamError::InvalidToken(m)
            | StreamError::ExpiredToken(m)
            | StreamError::NetworkError(m)
            | StreamError::PermissionDenied(m)
            | StreamError::OperationFailed(m)
            | StreamError::AuthProviderDisabled(m)
            | StreamError::General(m) => m,
        }
    }
}

impl From<VendorError> for StreamError {
    fn from(error: VendorError) -> Self {
        classify_code(error.code, error.message)
    }
}

/// Map a vendor error code and message to a domain error.
pub fn classify_code(code: ErrorCode, message: impl Into<String>) -> StreamError {
    let message = message.into();
    match code {
        ErrorCode::INVALID_TOKEN => StreamError::InvalidToken(message),
        ErrorCode::EXPIRED_TOKEN => StreamError::ExpiredToken(message),
        ErrorCode::NETWORK_ERROR => StreamError::NetworkError(message),
        ErrorCode::PERMISSION_DENIED => StreamError::PermissionDenied(message),
        ErrorCode::OPERATION_FAILED => StreamError::OperationFailed(message),
        ErrorCode::AUTH_PROVIDER_DISABLED => StreamError::AuthProviderDisabled(message),
        _ => StreamError::General(message),
    }
}

/// Map a vendor error to a domain error.
pub fn classify(error: &VendorError) -> StreamError {
    classify_code(error.code, error.message.clone())
}

/// Errors raised by the bridge itself, never by the vendor.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
