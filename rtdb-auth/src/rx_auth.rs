//! Stream bridge over an [`AuthClient`]

use std::fmt;
use std::sync::Arc;

use rtdb_stream::{classify, BridgeConfig, Emitter, EventStream, ListenerId, VendorError};
use tracing::debug;

use crate::client::{AuthClient, AuthCredential, AuthStateListener, SignInCallback, User};
use crate::error::AuthError;

/// Stream bridge over an authentication client
///
/// # Example
///
/// ```rust,ignore
/// let auth = RxAuth::new(client, BridgeConfig::default())?;
///
/// let user = auth
///     .observe_sign_in(AuthCredential::email_password("ada@example.com", "pw"))
///     .next()
///     .await;
///
/// // Ends with AuthError::SignedOut once the user goes away
/// let mut state = auth.observe_auth_state();
/// while let Some(Ok(user)) = state.next().await {
///     println!("signed in as {}", user);
/// }
/// ```
#[derive(Clone)]
pub struct RxAuth {
    client: Arc<dyn AuthClient>,
    config: BridgeConfig,
}

impl RxAuth {
    /// Create a bridge, validating the configuration.
    pub fn new(client: Arc<dyn AuthClient>, config: BridgeConfig) -> rtdb_stream::Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    pub fn client(&self) -> &Arc<dyn AuthClient> {
        &self.client
    }

    /// Sign in with a credential. Yields the user once, then completes.
    pub fn observe_sign_in(&self, credential: AuthCredential) -> EventStream<User, AuthError> {
        let client = Arc::clone(&self.client);
        EventStream::from_config(&self.config, move |emitter: Emitter<User, AuthError>| {
            debug!("Signing in with {} credential", credential.provider_id());
            client.sign_in_with_credential(credential, sign_in_callback(emitter));
        })
    }

    /// Sign in with a custom token. Yields the user once, then completes.
    pub fn observe_sign_in_with_token(
        &self,
        token: impl Into<String>,
    ) -> EventStream<User, AuthError> {
        let client = Arc::clone(&self.client);
        let token = token.into();
        EventStream::from_config(&self.config, move |emitter: Emitter<User, AuthError>| {
            debug!("Signing in with custom token");
            client.sign_in_with_custom_token(&token, sign_in_callback(emitter));
        })
    }

    /// Sign out and confirm through the auth state.
    ///
    /// Yields `true` once no user remains. Fails with
    /// [`AuthError::SignOutFailed`] if the state still reports a user.
    pub fn observe_sign_out(&self) -> EventStream<bool, AuthError> {
        let client = Arc::clone(&self.client);
        EventStream::from_config(&self.config, move |emitter: Emitter<bool, AuthError>| {
            client.sign_out();
            let listener = Arc::new(SignOutListener {
                emitter: emitter.clone(),
            });
            let id = client.add_auth_state_listener(listener);
            detach_on_teardown(&emitter, client, id);
        })
    }

    /// Signed-in user on every auth state change.
    ///
    /// Ends with [`AuthError::SignedOut`] as soon as no user is signed in,
    /// including at subscription time.
    pub fn observe_auth_state(&self) -> EventStream<User, AuthError> {
        let client = Arc::clone(&self.client);
        EventStream::from_config(&self.config, move |emitter: Emitter<User, AuthError>| {
            let listener = Arc::new(AuthStateForwarder {
                emitter: emitter.clone(),
            });
            let id = client.add_auth_state_listener(listener);
            debug!("Attached auth state listener {}", id);
            detach_on_teardown(&emitter, client, id);
        })
    }
}

impl fmt::Debug for RxAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxAuth")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn sign_in_callback(emitter: Emitter<User, AuthError>) -> SignInCallback {
    Box::new(move |result: Result<User, VendorError>| match result {
        Ok(user) => {
            debug!("Signed in as {}", user);
            emitter.on_next(user);
            emitter.on_completed();
        }
        Err(error) => {
            debug!("Sign in failed: {}", error);
            emitter.on_error(AuthError::Vendor(classify(&error)));
        }
    })
}

fn detach_on_teardown<T>(
    emitter: &Emitter<T, AuthError>,
    client: Arc<dyn AuthClient>,
    id: ListenerId,
) {
    emitter.set_cancellation(move || {
        client.remove_auth_state_listener(id);
        debug!("Detached auth state listener {}", id);
    });
}

struct SignOutListener {
    emitter: Emitter<bool, AuthError>,
}

impl AuthStateListener for SignOutListener {
    fn on_auth_state_changed(&self, current_user: Option<User>) {
        match current_user {
            None => {
                self.emitter.on_next(true);
                self.emitter.on_completed();
            }
            Some(user) => {
                debug!("User {} still signed in after sign out", user);
                self.emitter.on_error(AuthError::SignOutFailed);
            }
        }
    }
}

struct AuthStateForwarder {
    emitter: Emitter<User, AuthError>,
}

impl AuthStateListener for AuthStateForwarder {
    fn on_auth_state_changed(&self, current_user: Option<User>) {
        match current_user {
            Some(user) => self.emitter.on_next(user),
            None => self.emitter.on_error(AuthError::SignedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use rtdb_stream::{Backpressure, ErrorCode, ErrorKind};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Client whose answers are scripted by the test
    #[derive(Default)]
    struct ScriptedAuth {
        sign_in_result: Mutex<Option<Result<User, VendorError>>>,
        user_after_sign_out: Mutex<Option<User>>,
        current: Mutex<Option<User>>,
        listeners: Mutex<HashMap<ListenerId, Arc<dyn AuthStateListener>>>,
        removed: Mutex<Vec<ListenerId>>,
        next_id: AtomicU64,
    }

    impl ScriptedAuth {
        fn notify(&self) {
            let user = self.current.lock().clone();
            let listeners: Vec<_> = self.listeners.lock().values().cloned().collect();
            for listener in listeners {
                listener.on_auth_state_changed(user.clone());
            }
        }
    }

    impl AuthClient for ScriptedAuth {
        fn current_user(&self) -> Option<User> {
            self.current.lock().clone()
        }

        fn sign_in_with_credential(&self, _credential: AuthCredential, callback: SignInCallback) {
            let result = self
                .sign_in_result
                .lock()
                .take()
                .unwrap_or_else(|| Err(VendorError::new(ErrorCode::UNKNOWN_ERROR, "no script")));
            callback(result);
        }

        fn sign_in_with_custom_token(&self, token: &str, callback: SignInCallback) {
            callback(Ok(User::new(token, "custom")));
        }

        fn sign_out(&self) {
            *self.current.lock() = self.user_after_sign_out.lock().clone();
        }

        fn add_auth_state_listener(&self, listener: Arc<dyn AuthStateListener>) -> ListenerId {
            let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            listener.on_auth_state_changed(self.current_user());
            self.listeners.lock().insert(id, listener);
            id
        }

        fn remove_auth_state_listener(&self, id: ListenerId) {
            self.listeners.lock().remove(&id);
            self.removed.lock().push(id);
        }
    }

    fn rx(client: &Arc<ScriptedAuth>) -> RxAuth {
        RxAuth::new(client.clone(), BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let client: Arc<dyn AuthClient> = Arc::new(ScriptedAuth::default());
        let config = BridgeConfig::new().with_backpressure(Backpressure::Bounded(0));
        assert!(RxAuth::new(client, config).is_err());
    }

    #[tokio::test]
    async fn test_sign_in_yields_user_once() {
        let client = Arc::new(ScriptedAuth::default());
        *client.sign_in_result.lock() = Some(Ok(User::new("u1", "password")));

        let items: Vec<_> = rx(&client)
            .observe_sign_in(AuthCredential::email_password("a@b.c", "pw"))
            .collect()
            .await;
        assert_eq!(items, vec![Ok(User::new("u1", "password"))]);
    }

    #[tokio::test]
    async fn test_sign_in_failure_is_classified() {
        let client = Arc::new(ScriptedAuth::default());
        *client.sign_in_result.lock() = Some(Err(VendorError::new(
            ErrorCode::AUTH_PROVIDER_DISABLED,
            "provider disabled",
        )));

        let mut stream = rx(&client).observe_sign_in(AuthCredential::provider("google.com", "t"));
        let error = stream.next().await.unwrap().unwrap_err();
        assert_eq!(error.vendor_kind(), Some(ErrorKind::AuthProviderDisabled));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_in_with_token() {
        let client = Arc::new(ScriptedAuth::default());
        let mut stream = rx(&client).observe_sign_in_with_token("tok");
        assert_eq!(stream.next().await, Some(Ok(User::new("tok", "custom"))));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_sign_out_confirms_and_detaches() {
        let client = Arc::new(ScriptedAuth::default());
        *client.current.lock() = Some(User::new("u1", "password"));

        let items: Vec<_> = rx(&client).observe_sign_out().collect().await;
        assert_eq!(items, vec![Ok(true)]);
        assert!(client.listeners.lock().is_empty());
        assert_eq!(client.removed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_failure() {
        let client = Arc::new(ScriptedAuth::default());
        *client.user_after_sign_out.lock() = Some(User::new("stuck", "password"));

        let items: Vec<_> = rx(&client).observe_sign_out().collect().await;
        assert_eq!(items, vec![Err(AuthError::SignOutFailed)]);
    }

    #[tokio::test]
    async fn test_auth_state_ends_when_signed_out() {
        let client = Arc::new(ScriptedAuth::default());
        *client.current.lock() = Some(User::new("u1", "password"));

        let mut stream = rx(&client).observe_auth_state();
        assert_eq!(stream.next().await, Some(Ok(User::new("u1", "password"))));

        *client.current.lock() = Some(User::new("u2", "password"));
        client.notify();
        assert_eq!(stream.next().await, Some(Ok(User::new("u2", "password"))));

        *client.current.lock() = None;
        client.notify();
        assert_eq!(stream.next().await, Some(Err(AuthError::SignedOut)));
        assert_eq!(stream.next().await, None);
        assert!(client.listeners.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_auth_state_stream_detaches() {
        let client = Arc::new(ScriptedAuth::default());
        *client.current.lock() = Some(User::new("u1", "password"));

        let mut stream = rx(&client).observe_auth_state();
        assert!(stream.next().await.is_some());
        assert_eq!(client.listeners.lock().len(), 1);

        drop(stream);
        assert!(client.listeners.lock().is_empty());
    }
}
