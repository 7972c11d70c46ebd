//! In-memory database and its listener registry
//!
//! All state sits behind one `parking_lot` mutex. Mutations collect the
//! resulting listener notifications while holding it and hand them to a
//! [`Dispatcher`], which delivers them after the state lock is released and
//! in the order the mutations were applied. Listeners may call back into the
//! database.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rtdb_stream::{
    ChildEvent, ChildEventListener, DataSnapshot, ErrorCode, ListenerId, ValueEventListener,
    VendorError,
};
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::dispatch::{Deliver, Dispatcher};
use crate::error::{MemoryError, Result};
use crate::path::Path;
use crate::push_id::PushIdGenerator;
use crate::reference::MemoryReference;
use crate::tree;

/// Path of the connection flag
pub const CONNECTED_PATH: &str = ".info/connected";

/// A listener as requested by a caller
pub(crate) enum Attach {
    Value(Arc<dyn ValueEventListener>),
    Single(Arc<dyn ValueEventListener>),
    Child(Arc<dyn ChildEventListener>),
}

#[derive(Clone)]
enum Listener {
    Value(Arc<dyn ValueEventListener>),
    Child(Arc<dyn ChildEventListener>),
}

impl From<Attach> for Listener {
    fn from(attach: Attach) -> Self {
        match attach {
            Attach::Value(l) | Attach::Single(l) => Listener::Value(l),
            Attach::Child(l) => Listener::Child(l),
        }
    }
}

struct Registration {
    path: Path,
    listener: Listener,
}

struct AccessRule {
    path: Path,
    error: VendorError,
}

/// A callback to run once the state lock is released
enum Notification {
    Value(Arc<dyn ValueEventListener>, DataSnapshot),
    Child(Arc<dyn ChildEventListener>, ChildEvent),
    Cancelled(Listener, VendorError),
}

impl Deliver for Notification {
    fn deliver(self) {
        match self {
            Notification::Value(listener, snapshot) => listener.on_data_change(snapshot),
            Notification::Child(listener, event) => match event {
                ChildEvent::Added {
                    snapshot,
                    previous_child_name,
                } => listener.on_child_added(snapshot, previous_child_name),
                ChildEvent::Changed {
                    snapshot,
                    previous_child_name,
                } => listener.on_child_changed(snapshot, previous_child_name),
                ChildEvent::Removed { snapshot } => listener.on_child_removed(snapshot),
                ChildEvent::Moved {
                    snapshot,
                    previous_child_name,
                } => listener.on_child_moved(snapshot, previous_child_name),
            },
            Notification::Cancelled(Listener::Value(listener), error) => {
                listener.on_cancelled(error)
            }
            Notification::Cancelled(Listener::Child(listener), error) => {
                listener.on_cancelled(error)
            }
        }
    }
}

struct State {
    data: Value,
    connected: bool,
    rules: Vec<AccessRule>,
    listeners: BTreeMap<ListenerId, Registration>,
}

impl State {
    fn value_at(&self, path: &Path) -> Value {
        if path.is_info() {
            let info = json!({ ".info": { "connected": self.connected } });
            tree::get(&info, path)
        } else {
            tree::get(&self.data, path)
        }
    }

    fn denial(&self, path: &Path) -> Option<&VendorError> {
        self.rules
            .iter()
            .find(|rule| rule.path.contains(path))
            .map(|rule| &rule.error)
    }

    /// Run `mutate` and collect notifications for every listener whose
    /// location overlaps one of `changed`.
    fn apply<F>(&mut self, changed: &[Path], mutate: F) -> Vec<Notification>
    where
        F: FnOnce(&mut State),
    {
        let before: Vec<(ListenerId, Value)> = self
            .listeners
            .iter()
            .filter(|(_, reg)| changed.iter().any(|p| p.overlaps(&reg.path)))
            .map(|(id, reg)| (*id, self.value_at(&reg.path)))
            .collect();

        mutate(self);

        let mut notifications = Vec::new();
        for (id, old) in before {
            let Some(reg) = self.listeners.get(&id) else {
                continue;
            };
            let new = self.value_at(&reg.path);
            match &reg.listener {
                Listener::Value(listener) => {
                    if old != new {
                        let key = reg.path.key().map(str::to_string);
                        notifications.push(Notification::Value(
                            Arc::clone(listener),
                            DataSnapshot::new(key, new),
                        ));
                    }
                }
                Listener::Child(listener) => {
                    notifications.extend(
                        tree::child_events(&old, &new)
                            .into_iter()
                            .map(|event| Notification::Child(Arc::clone(listener), event)),
                    );
                }
            }
        }
        notifications
    }
}

struct Inner {
    state: Mutex<State>,
    dispatch: Dispatcher<Notification>,
    push_ids: PushIdGenerator,
    next_listener: AtomicU64,
}

/// In-memory realtime database
///
/// Cloning is cheap; clones share the same data and listeners.
///
/// # Example
///
/// ```rust,ignore
/// let db = MemoryDatabase::new();
/// let posts = db.reference("posts");
/// posts.try_set_value(json!({ "p1": { "title": "x" } }))?;
/// assert_eq!(db.value("posts/p1/title"), json!("x"));
/// ```
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl MemoryDatabase {
    /// Create an empty, connected database.
    pub fn new() -> Self {
        Self::with_data(Value::Null)
    }

    /// Create a connected database holding `data`.
    pub fn with_data(data: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    data: tree::normalize(data),
                    connected: true,
                    rules: Vec::new(),
                    listeners: BTreeMap::new(),
                }),
                dispatch: Dispatcher::new(),
                push_ids: PushIdGenerator::new(),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Reference to the root location.
    pub fn root(&self) -> MemoryReference {
        MemoryReference::new(self.clone(), Path::root())
    }

    /// Reference to a slash-separated location.
    pub fn reference(&self, path: &str) -> MemoryReference {
        MemoryReference::new(self.clone(), Path::parse(path))
    }

    /// Current value at a location, `Null` when empty.
    pub fn value(&self, path: &str) -> Value {
        self.inner.state.lock().value_at(&Path::parse(path))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    /// Flip the connection flag at `.info/connected`.
    pub fn set_connected(&self, connected: bool) {
        self.inner.dispatch.run(|| {
            let mut state = self.inner.state.lock();
            if state.connected == connected {
                return ((), Vec::new());
            }
            debug!("Connection flag set to {}", connected);
            let path = Path::parse(CONNECTED_PATH);
            ((), state.apply(&[path], |s| s.connected = connected))
        });
    }

    /// Deny access at and below `path`.
    ///
    /// Listeners there are cancelled with `error` and removed, new listeners
    /// are cancelled on attach, and writes are rejected.
    pub fn deny(&self, path: &str, error: VendorError) {
        let path = Path::parse(path);
        self.inner.dispatch.run(|| {
            let mut state = self.inner.state.lock();
            let revoked: Vec<ListenerId> = state
                .listeners
                .iter()
                .filter(|(_, reg)| path.contains(&reg.path))
                .map(|(id, _)| *id)
                .collect();
            debug!("Denying {} ({} listeners cancelled)", path, revoked.len());
            state.rules.push(AccessRule {
                path,
                error: error.clone(),
            });
            let cancelled = revoked
                .into_iter()
                .filter_map(|id| state.listeners.remove(&id))
                .map(|reg| Notification::Cancelled(reg.listener, error.clone()))
                .collect();
            ((), cancelled)
        });
    }

    /// Deny access at and below `path` with a `PERMISSION_DENIED` error.
    pub fn deny_permission(&self, path: &str) {
        self.deny(
            path,
            VendorError::new(
                ErrorCode::PERMISSION_DENIED,
                "Client doesn't have permission to access the desired data.",
            ),
        );
    }

    /// Remove the access rules installed exactly at `path`.
    pub fn allow(&self, path: &str) {
        let path = Path::parse(path);
        self.inner.state.lock().rules.retain(|rule| rule.path != path);
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    /// Number of listeners attached exactly at `path`.
    pub fn listener_count_at(&self, path: &str) -> usize {
        let path = Path::parse(path);
        self.inner
            .state
            .lock()
            .listeners
            .values()
            .filter(|reg| reg.path == path)
            .count()
    }

    pub(crate) fn generate_push_id(&self) -> String {
        self.inner.push_ids.generate()
    }

    pub(crate) fn attach(&self, path: Path, attach: Attach) -> ListenerId {
        let id = ListenerId::new(self.inner.next_listener.fetch_add(1, Ordering::SeqCst) + 1);

        self.inner.dispatch.run(|| {
            let mut state = self.inner.state.lock();
            let notifications = if let Some(error) = state.denial(&path).cloned() {
                debug!("Listener {} at {} cancelled on attach: {}", id, path, error);
                vec![Notification::Cancelled(attach.into(), error)]
            } else {
                let current = state.value_at(&path);
                let key = path.key().map(str::to_string);
                match attach {
                    Attach::Single(listener) => {
                        vec![Notification::Value(listener, DataSnapshot::new(key, current))]
                    }
                    Attach::Value(listener) => {
                        state.listeners.insert(
                            id,
                            Registration {
                                path,
                                listener: Listener::Value(Arc::clone(&listener)),
                            },
                        );
                        vec![Notification::Value(listener, DataSnapshot::new(key, current))]
                    }
                    Attach::Child(listener) => {
                        state.listeners.insert(
                            id,
                            Registration {
                                path,
                                listener: Listener::Child(Arc::clone(&listener)),
                            },
                        );
                        tree::child_events(&Value::Null, &current)
                            .into_iter()
                            .map(|event| Notification::Child(Arc::clone(&listener), event))
                            .collect()
                    }
                }
            };
            (id, notifications)
        })
    }

    pub(crate) fn detach(&self, id: ListenerId) {
        if self.inner.state.lock().listeners.remove(&id).is_some() {
            trace!("Removed listener {}", id);
        }
    }

    /// Apply several writes atomically. Listeners see one change.
    pub(crate) fn write(&self, writes: Vec<(Path, Value)>) -> Result<()> {
        self.inner.dispatch.run(|| {
            let mut state = self.inner.state.lock();
            if let Err(e) = check_writes(&state, &writes) {
                return (Err(e), Vec::new());
            }

            let changed: Vec<Path> = writes.iter().map(|(path, _)| path.clone()).collect();
            let notifications = state.apply(&changed, move |s| {
                for (path, value) in writes {
                    tree::set(&mut s.data, &path, value);
                }
            });
            (Ok(()), notifications)
        })
    }
}

fn check_writes(state: &State, writes: &[(Path, Value)]) -> Result<()> {
    for (path, value) in writes {
        if path.is_info() {
            return Err(MemoryError::ReadOnly(path.clone()));
        }
        path.validate()?;
        tree::validate(value)?;
        if let Some(error) = state.denial(path) {
            return Err(MemoryError::PermissionDenied {
                path: path.clone(),
                message: error.message.clone(),
            });
        }
    }
    Ok(())
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MemoryDatabase")
            .field("connected", &state.connected)
            .field("listener_count", &state.listeners.len())
            .field("rule_count", &state.rules.len())
            .finish()
    }
}
