use rtdb_stream::{ErrorKind, StreamError};
use thiserror::Error;

/// Errors delivered on auth streams
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No user is signed in while one was expected
    #[error("User signed out")]
    SignedOut,

    /// A user was still signed in after signing out
    #[error("User didn't sign out successfully")]
    SignOutFailed,

    /// The auth client reported an error
    #[error(transparent)]
    Vendor(#[from] StreamError),
}

impl AuthError {
    /// Classified kind of a vendor error, `None` for the bridge's own errors.
    pub fn vendor_kind(&self) -> Option<ErrorKind> {
        match self {
            AuthError::Vendor(error) => Some(error.kind()),
            AuthError::SignedOut | AuthError::SignOutFailed => None,
        }
    }
}

/// Result type for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;
