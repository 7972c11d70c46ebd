//! Database bridge
//!
//! [`RxDatabase`] turns the listener registration primitives of a
//! realtime-database client into [`EventStream`]s. Every stream attaches
//! exactly one vendor listener when first polled and removes it when it
//! terminates or is dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::emitter::Emitter;
use crate::error::{classify, Result, StreamError};
use crate::listener::{ChildEventListener, DatabaseReference, Query, ValueEventListener};
use crate::stream::{EventStream, FilteredEventStream};
use crate::types::{ChildEvent, ChildEventKind, DataSnapshot, ListenerId, VendorError};

/// Location of the vendor's connection flag, relative to the root
pub const CONNECTION_STATE_PATH: &str = ".info/connected";

/// Stream bridge over a realtime-database client
#[derive(Debug, Clone, Default)]
pub struct RxDatabase {
    config: BridgeConfig,
}

impl RxDatabase {
    /// Create a bridge, validating the configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Every value callback of `query`, until the vendor cancels the listener
    /// or the stream is dropped.
    pub fn observe_value_event<Q>(&self, query: Arc<Q>) -> EventStream<DataSnapshot>
    where
        Q: Query + ?Sized + 'static,
    {
        self.value_stream(query, Registration::Continuous, |emitter| {
            Arc::new(ValueForwarder { emitter })
        })
    }

    /// The first value of `query`, then completion.
    pub fn observe_single_value<Q>(&self, query: Arc<Q>) -> EventStream<DataSnapshot>
    where
        Q: Query + ?Sized + 'static,
    {
        self.value_stream(query, Registration::Single, |emitter| {
            Arc::new(SingleValueForwarder { emitter })
        })
    }

    /// Every child callback of `query` as a [`ChildEvent`].
    pub fn observe_child_event<Q>(&self, query: Arc<Q>) -> EventStream<ChildEvent>
    where
        Q: Query + ?Sized + 'static,
    {
        EventStream::from_config(&self.config, move |emitter: Emitter<ChildEvent, StreamError>| {
            let listener = Arc::new(ChildForwarder {
                emitter: emitter.clone(),
            });
            let id = query.add_child_event_listener(listener);
            debug!("Attached child listener {}", id);
            detach_on_teardown(&emitter, query, id);
        })
    }

    /// Child additions only.
    pub fn observe_child_added<Q>(&self, query: Arc<Q>) -> FilteredEventStream<ChildEvent>
    where
        Q: Query + ?Sized + 'static,
    {
        self.observe_child_kind(query, ChildEventKind::Added)
    }

    /// Child changes only.
    pub fn observe_child_changed<Q>(&self, query: Arc<Q>) -> FilteredEventStream<ChildEvent>
    where
        Q: Query + ?Sized + 'static,
    {
        self.observe_child_kind(query, ChildEventKind::Changed)
    }

    /// Child removals only.
    pub fn observe_child_removed<Q>(&self, query: Arc<Q>) -> FilteredEventStream<ChildEvent>
    where
        Q: Query + ?Sized + 'static,
    {
        self.observe_child_kind(query, ChildEventKind::Removed)
    }

    /// Child moves only.
    pub fn observe_child_moved<Q>(&self, query: Arc<Q>) -> FilteredEventStream<ChildEvent>
    where
        Q: Query + ?Sized + 'static,
    {
        self.observe_child_kind(query, ChildEventKind::Moved)
    }

    fn observe_child_kind<Q>(
        &self,
        query: Arc<Q>,
        kind: ChildEventKind,
    ) -> FilteredEventStream<ChildEvent>
    where
        Q: Query + ?Sized + 'static,
    {
        self.observe_child_event(query)
            .filter(move |event| event.kind() == kind)
    }

    /// Write `payload` to a new child with a generated key.
    ///
    /// Yields the generated key once the write is visible, then completes.
    /// A rejected write or a vendor cancellation ends the stream with the
    /// classified error instead.
    pub fn observe_set_value_push<R>(
        &self,
        reference: Arc<R>,
        payload: Value,
    ) -> EventStream<String>
    where
        R: DatabaseReference + ?Sized + 'static,
    {
        EventStream::from_config(
            &self.config,
            move |emitter: Emitter<String, StreamError>| {
                let child = reference.push();
                let key = child.key().unwrap_or_default();
                debug!("Writing to generated child {}", key);
                write_and_observe(&emitter, child, key, |target| target.set_value(payload));
            },
        )
    }

    /// Replace the data at `reference` with `payload`.
    ///
    /// Yields the key of `reference` (`None` for the root) once the write is
    /// visible, then completes.
    pub fn observe_set_value<R>(
        &self,
        reference: Arc<R>,
        payload: Value,
    ) -> EventStream<Option<String>>
    where
        R: DatabaseReference + ?Sized + 'static,
    {
        EventStream::from_config(
            &self.config,
            move |emitter: Emitter<Option<String>, StreamError>| {
                let key = reference.key();
                write_and_observe(&emitter, reference, key, |target| target.set_value(payload));
            },
        )
    }

    /// Write several children of `reference` at once.
    ///
    /// Yields the key of `reference` once the write is visible, then
    /// completes.
    pub fn observe_update_children<R>(
        &self,
        reference: Arc<R>,
        data: Map<String, Value>,
    ) -> EventStream<Option<String>>
    where
        R: DatabaseReference + ?Sized + 'static,
    {
        EventStream::from_config(
            &self.config,
            move |emitter: Emitter<Option<String>, StreamError>| {
                let key = reference.key();
                write_and_observe(&emitter, reference, key, |target| {
                    target.update_children(data)
                });
            },
        )
    }

    /// Connection flag of the database `reference` belongs to.
    ///
    /// Emits the current flag, then only changes of it. Payloads that are not
    /// booleans are skipped.
    pub fn observe_connection_state<R>(&self, reference: Arc<R>) -> EventStream<bool>
    where
        R: DatabaseReference + ?Sized + 'static,
    {
        let location = reference.root().child(CONNECTION_STATE_PATH);
        self.value_stream(location, Registration::Continuous, |emitter| {
            Arc::new(ConnectionForwarder {
                emitter,
                last: Mutex::new(None),
            })
        })
    }

    fn value_stream<Q, T, F>(
        &self,
        query: Arc<Q>,
        registration: Registration,
        make_listener: F,
    ) -> EventStream<T>
    where
        Q: Query + ?Sized + 'static,
        T: Send + 'static,
        F: FnOnce(Emitter<T, StreamError>) -> Arc<dyn ValueEventListener> + Send + 'static,
    {
        EventStream::from_config(&self.config, move |emitter: Emitter<T, StreamError>| {
            let listener = make_listener(emitter.clone());
            let id = match registration {
                Registration::Continuous => query.add_value_event_listener(listener),
                Registration::Single => query.add_listener_for_single_value_event(listener),
            };
            debug!("Attached {} value listener {}", registration, id);
            detach_on_teardown(&emitter, query, id);
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Registration {
    Continuous,
    Single,
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Registration::Continuous => f.write_str("continuous"),
            Registration::Single => f.write_str("single"),
        }
    }
}

fn detach_on_teardown<T, Q>(emitter: &Emitter<T, StreamError>, query: Arc<Q>, id: ListenerId)
where
    Q: Query + ?Sized + 'static,
{
    emitter.set_cancellation(move || {
        query.remove_event_listener(id);
        debug!("Detached listener {}", id);
    });
}

/// Perform `write` on `target`, then listen once and emit `key` on the first
/// value. A rejected write fails the stream without attaching a listener.
fn write_and_observe<R, K, W>(
    emitter: &Emitter<K, StreamError>,
    target: Arc<R>,
    key: K,
    write: W,
) where
    R: DatabaseReference + ?Sized + 'static,
    K: Send + 'static,
    W: FnOnce(&R) -> std::result::Result<(), VendorError>,
{
    if let Err(error) = write(&*target) {
        warn!("Write rejected by vendor: {}", error);
        emitter.on_error(classify(&error));
        return;
    }

    let listener = Arc::new(WriteForwarder {
        emitter: emitter.clone(),
        key: Mutex::new(Some(key)),
    });
    let id = target.add_listener_for_single_value_event(listener);
    detach_on_teardown(emitter, target, id);
}

struct ValueForwarder {
    emitter: Emitter<DataSnapshot, StreamError>,
}

impl ValueEventListener for ValueForwarder {
    fn on_data_change(&self, snapshot: DataSnapshot) {
        self.emitter.on_next(snapshot);
    }

    fn on_cancelled(&self, error: VendorError) {
        debug!("Value listener cancelled by vendor: {}", error);
        self.emitter.on_error(classify(&error));
    }
}

struct SingleValueForwarder {
    emitter: Emitter<DataSnapshot, StreamError>,
}

impl ValueEventListener for SingleValueForwarder {
    fn on_data_change(&self, snapshot: DataSnapshot) {
        self.emitter.on_next(snapshot);
        self.emitter.on_completed();
    }

    fn on_cancelled(&self, error: VendorError) {
        debug!("Single value listener cancelled by vendor: {}", error);
        self.emitter.on_error(classify(&error));
    }
}

struct ChildForwarder {
    emitter: Emitter<ChildEvent, StreamError>,
}

impl ChildEventListener for ChildForwarder {
    fn on_child_added(&self, snapshot: DataSnapshot, previous_child_name: Option<String>) {
        self.emitter.on_next(ChildEvent::Added {
            snapshot,
            previous_child_name,
        });
    }

    fn on_child_changed(&self, snapshot: DataSnapshot, previous_child_name: Option<String>) {
        self.emitter.on_next(ChildEvent::Changed {
            snapshot,
            previous_child_name,
        });
    }

    fn on_child_removed(&self, snapshot: DataSnapshot) {
        self.emitter.on_next(ChildEvent::Removed { snapshot });
    }

    fn on_child_moved(&self, snapshot: DataSnapshot, previous_child_name: Option<String>) {
        self.emitter.on_next(ChildEvent::Moved {
            snapshot,
            previous_child_name,
        });
    }

    fn on_cancelled(&self, error: VendorError) {
        debug!("Child listener cancelled by vendor: {}", error);
        self.emitter.on_error(classify(&error));
    }
}

/// Emits a precomputed key on the first value callback
struct WriteForwarder<K> {
    emitter: Emitter<K, StreamError>,
    key: Mutex<Option<K>>,
}

impl<K: Send> ValueEventListener for WriteForwarder<K> {
    fn on_data_change(&self, _snapshot: DataSnapshot) {
        let key = self.key.lock().take();
        if let Some(key) = key {
            self.emitter.on_next(key);
            self.emitter.on_completed();
        }
    }

    fn on_cancelled(&self, error: VendorError) {
        warn!("Write rejected by vendor: {}", error);
        self.emitter.on_error(classify(&error));
    }
}

/// Emits the connection flag when it differs from the last emitted one
struct ConnectionForwarder {
    emitter: Emitter<bool, StreamError>,
    last: Mutex<Option<bool>>,
}

impl ValueEventListener for ConnectionForwarder {
    fn on_data_change(&self, snapshot: DataSnapshot) {
        let Some(connected) = snapshot.value().as_bool() else {
            warn!("Ignoring non-boolean connection state: {}", snapshot.value());
            return;
        };

        let changed = {
            let mut last = self.last.lock();
            let changed = *last != Some(connected);
            *last = Some(connected);
            changed
        };

        if changed {
            debug!("Connection state changed: connected={}", connected);
            self.emitter.on_next(connected);
        }
    }

    fn on_cancelled(&self, error: VendorError) {
        self.emitter.on_error(classify(&error));
    }
}
