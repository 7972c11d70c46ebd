//! In-memory authentication client

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rtdb_auth::{AuthClient, AuthCredential, AuthStateListener, SignInCallback, User};
use rtdb_stream::{ErrorCode, ListenerId, VendorError};
use tracing::debug;

use crate::dispatch::{Deliver, Dispatcher};

/// Provider id reported for custom-token sign-ins
pub const CUSTOM_PROVIDER: &str = "custom";

struct Account {
    password: String,
    user: User,
}

struct CustomToken {
    user: User,
    expired: bool,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    custom_tokens: HashMap<String, CustomToken>,
    provider_tokens: HashMap<(String, String), User>,
    disabled_providers: HashSet<String>,
    offline: bool,
    sign_out_blocked: bool,
    current: Option<User>,
    listeners: BTreeMap<ListenerId, Arc<dyn AuthStateListener>>,
}

impl AuthState {
    fn check_available(&self, provider_id: &str) -> Result<(), VendorError> {
        if self.offline {
            return Err(VendorError::new(
                ErrorCode::NETWORK_ERROR,
                "A network error has occurred",
            ));
        }
        if self.disabled_providers.contains(provider_id) {
            return Err(VendorError::new(
                ErrorCode::AUTH_PROVIDER_DISABLED,
                format!("The {} sign-in provider is disabled", provider_id),
            ));
        }
        Ok(())
    }

    fn authenticate(&self, credential: &AuthCredential) -> Result<User, VendorError> {
        self.check_available(credential.provider_id())?;
        match credential {
            AuthCredential::EmailPassword { email, password } => self
                .accounts
                .get(email)
                .filter(|account| &account.password == password)
                .map(|account| account.user.clone())
                .ok_or_else(|| {
                    VendorError::new(
                        ErrorCode::OPERATION_FAILED,
                        "The password is invalid or the user does not exist",
                    )
                }),
            AuthCredential::Provider {
                provider_id,
                id_token,
            } => self
                .provider_tokens
                .get(&(provider_id.clone(), id_token.clone()))
                .cloned()
                .ok_or_else(|| {
                    VendorError::new(
                        ErrorCode::INVALID_TOKEN,
                        "The supplied credential is malformed",
                    )
                }),
        }
    }

    fn authenticate_token(&self, token: &str) -> Result<User, VendorError> {
        self.check_available(CUSTOM_PROVIDER)?;
        match self.custom_tokens.get(token) {
            Some(entry) if entry.expired => Err(VendorError::new(
                ErrorCode::EXPIRED_TOKEN,
                "The custom token has expired",
            )),
            Some(entry) => Ok(entry.user.clone()),
            None => Err(VendorError::new(
                ErrorCode::INVALID_TOKEN,
                "The custom token format is incorrect",
            )),
        }
    }

    fn notify_all(&self, current_user: Option<User>) -> Vec<AuthEvent> {
        self.listeners
            .values()
            .map(|listener| AuthEvent::StateChanged(Arc::clone(listener), current_user.clone()))
            .collect()
    }
}

/// A callback to run once the state lock is released
enum AuthEvent {
    StateChanged(Arc<dyn AuthStateListener>, Option<User>),
    SignInFinished(SignInCallback, Result<User, VendorError>),
}

impl Deliver for AuthEvent {
    fn deliver(self) {
        match self {
            AuthEvent::StateChanged(listener, current_user) => {
                listener.on_auth_state_changed(current_user)
            }
            AuthEvent::SignInFinished(callback, outcome) => callback(outcome),
        }
    }
}

/// In-memory authentication client
///
/// Accounts, custom tokens and provider tokens are registered up front;
/// switches simulate a disabled provider, a lost network and a sign-out
/// that does not take effect. Cloning is cheap; clones share state.
///
/// Listeners and sign-in callbacks run after the state lock is released, in
/// the order the state changed.
#[derive(Clone, Default)]
pub struct MemoryAuth {
    state: Arc<Mutex<AuthState>>,
    dispatch: Arc<Dispatcher<AuthEvent>>,
    next_listener: Arc<AtomicU64>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an email/password account.
    pub fn create_user(&self, email: &str, password: &str) -> User {
        let user = User::new(new_uid(), "password").with_email(email);
        self.state.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// Register a custom token that signs in as `uid`.
    pub fn add_custom_token(&self, token: &str, uid: &str) -> User {
        let user = User::new(uid, CUSTOM_PROVIDER);
        self.state.lock().custom_tokens.insert(
            token.to_string(),
            CustomToken {
                user: user.clone(),
                expired: false,
            },
        );
        user
    }

    /// Mark a custom token as expired.
    pub fn expire_custom_token(&self, token: &str) {
        if let Some(entry) = self.state.lock().custom_tokens.get_mut(token) {
            entry.expired = true;
        }
    }

    /// Register an identity-provider token.
    pub fn add_provider_user(&self, provider_id: &str, id_token: &str) -> User {
        let user = User::new(new_uid(), provider_id);
        self.state
            .lock()
            .provider_tokens
            .insert((provider_id.to_string(), id_token.to_string()), user.clone());
        user
    }

    pub fn disable_provider(&self, provider_id: &str) {
        self.state.lock().disabled_providers.insert(provider_id.to_string());
    }

    pub fn enable_provider(&self, provider_id: &str) {
        self.state.lock().disabled_providers.remove(provider_id);
    }

    /// Fail every sign-in with a network error while set.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Make `sign_out` keep the current user while set.
    pub fn set_sign_out_blocked(&self, blocked: bool) {
        self.state.lock().sign_out_blocked = blocked;
    }

    /// Number of registered auth state listeners.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Authenticate and record the outcome in one step, then notify
    /// listeners and run the callback.
    fn sign_in<F>(&self, callback: SignInCallback, authenticate: F)
    where
        F: FnOnce(&AuthState) -> Result<User, VendorError>,
    {
        self.dispatch.run(|| {
            let mut state = self.state.lock();
            let outcome = authenticate(&*state);
            let mut events = Vec::new();
            if let Ok(user) = &outcome {
                debug!("Signed in {}", user);
                state.current = Some(user.clone());
                events = state.notify_all(Some(user.clone()));
            }
            events.push(AuthEvent::SignInFinished(callback, outcome));
            ((), events)
        });
    }
}

impl AuthClient for MemoryAuth {
    fn current_user(&self) -> Option<User> {
        self.state.lock().current.clone()
    }

    fn sign_in_with_credential(&self, credential: AuthCredential, callback: SignInCallback) {
        self.sign_in(callback, |state| state.authenticate(&credential));
    }

    fn sign_in_with_custom_token(&self, token: &str, callback: SignInCallback) {
        self.sign_in(callback, |state| state.authenticate_token(token));
    }

    fn sign_out(&self) {
        self.dispatch.run(|| {
            let mut state = self.state.lock();
            if state.sign_out_blocked || state.current.is_none() {
                return ((), Vec::new());
            }
            state.current = None;
            let events = state.notify_all(None);
            debug!("Signed out, notifying {} listeners", events.len());
            ((), events)
        });
    }

    fn add_auth_state_listener(&self, listener: Arc<dyn AuthStateListener>) -> ListenerId {
        let id = ListenerId::new(self.next_listener.fetch_add(1, Ordering::SeqCst) + 1);
        self.dispatch.run(|| {
            let mut state = self.state.lock();
            state.listeners.insert(id, Arc::clone(&listener));
            let current = state.current.clone();
            (id, vec![AuthEvent::StateChanged(listener, current)])
        })
    }

    fn remove_auth_state_listener(&self, id: ListenerId) {
        self.state.lock().listeners.remove(&id);
    }
}

impl fmt::Debug for MemoryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryAuth")
            .field("current", &state.current)
            .field("account_count", &state.accounts.len())
            .field("listener_count", &state.listeners.len())
            .finish()
    }
}

fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sign_in(auth: &MemoryAuth, credential: AuthCredential) -> Result<User, VendorError> {
        let slot = Arc::new(Mutex::new(None));
        let slot_in = Arc::clone(&slot);
        auth.sign_in_with_credential(
            credential,
            Box::new(move |outcome: Result<User, VendorError>| *slot_in.lock() = Some(outcome)),
        );
        let outcome = slot.lock().take();
        outcome.expect("callback runs synchronously")
    }

    #[derive(Default)]
    struct StateRecorder {
        seen: Mutex<Vec<Option<String>>>,
    }

    impl AuthStateListener for StateRecorder {
        fn on_auth_state_changed(&self, current_user: Option<User>) {
            self.seen.lock().push(current_user.map(|u| u.uid));
        }
    }

    #[test]
    fn test_email_password_sign_in() {
        let auth = MemoryAuth::new();
        let user = auth.create_user("ada@example.com", "pw");

        let credential = AuthCredential::email_password("ada@example.com", "pw");
        assert_eq!(sign_in(&auth, credential), Ok(user.clone()));
        assert_eq!(auth.current_user(), Some(user));
    }

    #[rstest]
    #[case::wrong_password(
        AuthCredential::email_password("ada@example.com", "nope"),
        ErrorCode::OPERATION_FAILED
    )]
    #[case::unknown_user(
        AuthCredential::email_password("bob@example.com", "pw"),
        ErrorCode::OPERATION_FAILED
    )]
    #[case::unknown_provider_token(
        AuthCredential::provider("google.com", "t"),
        ErrorCode::INVALID_TOKEN
    )]
    fn test_sign_in_failures(#[case] credential: AuthCredential, #[case] expected: ErrorCode) {
        let auth = MemoryAuth::new();
        auth.create_user("ada@example.com", "pw");
        let error = sign_in(&auth, credential).unwrap_err();
        assert_eq!(error.code, expected);
        assert_eq!(auth.current_user(), None);
    }

    #[test]
    fn test_disabled_provider_and_offline() {
        let auth = MemoryAuth::new();
        auth.create_user("ada@example.com", "pw");
        let credential = AuthCredential::email_password("ada@example.com", "pw");

        auth.disable_provider("password");
        assert_eq!(
            sign_in(&auth, credential.clone()).unwrap_err().code,
            ErrorCode::AUTH_PROVIDER_DISABLED
        );

        auth.enable_provider("password");
        auth.set_offline(true);
        assert_eq!(
            sign_in(&auth, credential.clone()).unwrap_err().code,
            ErrorCode::NETWORK_ERROR
        );

        auth.set_offline(false);
        assert!(sign_in(&auth, credential).is_ok());
    }

    #[test]
    fn test_custom_tokens() {
        let auth = MemoryAuth::new();
        auth.add_custom_token("tok", "u1");

        let outcome = Arc::new(Mutex::new(None));
        let record = |slot: Arc<Mutex<Option<Result<User, VendorError>>>>| -> SignInCallback {
            Box::new(move |r: Result<User, VendorError>| *slot.lock() = Some(r))
        };

        auth.sign_in_with_custom_token("tok", record(Arc::clone(&outcome)));
        assert_eq!(outcome.lock().take().unwrap().unwrap().uid, "u1");

        auth.expire_custom_token("tok");
        auth.sign_in_with_custom_token("tok", record(Arc::clone(&outcome)));
        assert_eq!(
            outcome.lock().take().unwrap().unwrap_err().code,
            ErrorCode::EXPIRED_TOKEN
        );
    }

    #[test]
    fn test_auth_state_listeners() {
        let auth = MemoryAuth::new();
        auth.create_user("ada@example.com", "pw");
        let recorder = Arc::new(StateRecorder::default());
        let id = auth.add_auth_state_listener(recorder.clone());

        let user = sign_in(&auth, AuthCredential::email_password("ada@example.com", "pw")).unwrap();
        auth.sign_out();
        auth.sign_out();
        auth.remove_auth_state_listener(id);
        auth.remove_auth_state_listener(id);

        assert_eq!(*recorder.seen.lock(), vec![None, Some(user.uid), None]);
        assert_eq!(auth.listener_count(), 0);
    }

    #[test]
    fn test_blocked_sign_out_keeps_user() {
        let auth = MemoryAuth::new();
        auth.add_custom_token("tok", "u1");
        auth.sign_in_with_custom_token("tok", Box::new(|_: Result<User, VendorError>| {}));

        auth.set_sign_out_blocked(true);
        auth.sign_out();
        assert_eq!(auth.current_user().map(|u| u.uid), Some("u1".to_string()));
    }

    #[test]
    fn test_sign_out_from_listener_is_delivered_in_order() {
        struct Chained {
            auth: MemoryAuth,
            seen: Mutex<Vec<Option<String>>>,
        }

        impl AuthStateListener for Chained {
            fn on_auth_state_changed(&self, current_user: Option<User>) {
                if current_user.is_some() {
                    self.auth.sign_out();
                }
                self.seen.lock().push(current_user.map(|u| u.uid));
            }
        }

        let auth = MemoryAuth::new();
        auth.add_custom_token("tok", "u1");
        let listener = Arc::new(Chained {
            auth: auth.clone(),
            seen: Mutex::new(Vec::new()),
        });
        auth.add_auth_state_listener(listener.clone());
        auth.sign_in_with_custom_token("tok", Box::new(|_: Result<User, VendorError>| {}));

        // The sign-out made from inside the callback is delivered after it
        assert_eq!(
            *listener.seen.lock(),
            vec![None, Some("u1".to_string()), None]
        );
        assert_eq!(auth.current_user(), None);
    }

    #[test]
    fn test_listener_added_during_sign_in_ends_on_current_user() {
        for _ in 0..50 {
            let auth = MemoryAuth::new();
            auth.add_custom_token("tok", "u1");

            let signer = {
                let auth = auth.clone();
                std::thread::spawn(move || {
                    let ignore = |_: Result<User, VendorError>| {};
                    auth.sign_in_with_custom_token("tok", Box::new(ignore))
                })
            };
            let recorder = Arc::new(StateRecorder::default());
            auth.add_auth_state_listener(recorder.clone());
            signer.join().unwrap();

            let last = recorder.seen.lock().last().cloned().flatten();
            assert_eq!(last, Some("u1".to_string()));
        }
    }
}
