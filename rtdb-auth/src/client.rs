//! Auth client traits
//!
//! Mirrors the callback surface of the vendor's authentication client:
//! sign-in operations report through a one-shot callback, and state changes
//! are pushed to registered [`AuthStateListener`]s.

use std::fmt;
use std::sync::Arc;

use rtdb_stream::{ListenerId, VendorError};
use serde::{Deserialize, Serialize};

/// A signed-in user as reported by the auth client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Provider that authenticated the user, e.g. `password` or `custom`
    pub provider_id: String,
}

impl User {
    pub fn new(uid: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            provider_id: provider_id.into(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.uid, email),
            None => write!(f, "{}", self.uid),
        }
    }
}

/// Credential presented to [`AuthClient::sign_in_with_credential`]
#[derive(Clone, PartialEq, Eq)]
pub enum AuthCredential {
    /// Email and password account
    EmailPassword { email: String, password: String },
    /// Token issued by a federated identity provider
    Provider { provider_id: String, id_token: String },
}

impl AuthCredential {
    pub fn email_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        AuthCredential::EmailPassword {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn provider(provider_id: impl Into<String>, id_token: impl Into<String>) -> Self {
        AuthCredential::Provider {
            provider_id: provider_id.into(),
            id_token: id_token.into(),
        }
    }

    /// Identifier of the provider the credential belongs to.
    pub fn provider_id(&self) -> &str {
        match self {
            AuthCredential::EmailPassword { .. } => "password",
            AuthCredential::Provider { provider_id, .. } => provider_id,
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthCredential::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .finish_non_exhaustive(),
            AuthCredential::Provider { provider_id, .. } => f
                .debug_struct("Provider")
                .field("provider_id", provider_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Completion callback of a sign-in operation, invoked exactly once
pub type SignInCallback = Box<dyn FnOnce(Result<User, VendorError>) + Send>;

/// Receives auth state changes.
///
/// Called with the current user when registered, then on every sign-in and
/// sign-out.
pub trait AuthStateListener: Send + Sync {
    fn on_auth_state_changed(&self, current_user: Option<User>);
}

/// Callback-based authentication client
pub trait AuthClient: Send + Sync {
    /// User currently signed in, if any.
    fn current_user(&self) -> Option<User>;

    fn sign_in_with_credential(&self, credential: AuthCredential, callback: SignInCallback);

    fn sign_in_with_custom_token(&self, token: &str, callback: SignInCallback);

    /// Sign the current user out. Listeners are notified of the change.
    fn sign_out(&self);

    fn add_auth_state_listener(&self, listener: Arc<dyn AuthStateListener>) -> ListenerId;

    /// Remove a listener. Unknown ids are ignored.
    fn remove_auth_state_listener(&self, id: ListenerId);
}
