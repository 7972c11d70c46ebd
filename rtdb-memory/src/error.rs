use rtdb_stream::{ErrorCode, VendorError};
use thiserror::Error;

use crate::path::Path;

/// Errors returned by writes to the in-memory database
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Client writes below `.info` are not allowed
    #[error("Location {0} is read-only")]
    ReadOnly(Path),

    /// An access rule denies the location
    #[error("Permission denied at {path}: {message}")]
    PermissionDenied { path: Path, message: String },

    /// A path segment or object key contains a forbidden character
    #[error("Invalid key {0:?}: keys may not be empty or contain . # $ [ ] or /")]
    InvalidKey(String),
}

impl MemoryError {
    /// The error as the vendor would report it to a listener.
    pub fn to_vendor_error(&self) -> VendorError {
        let code = match self {
            MemoryError::PermissionDenied { .. } | MemoryError::ReadOnly(_) => {
                ErrorCode::PERMISSION_DENIED
            }
            MemoryError::InvalidKey(_) => ErrorCode::OPERATION_FAILED,
        };
        VendorError::new(code, self.to_string())
    }
}

/// Result type for in-memory database operations
pub type Result<T> = std::result::Result<T, MemoryError>;
