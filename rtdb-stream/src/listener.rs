//! Vendor-facing traits: the listener callbacks a realtime-database client
//! invokes, and the registration primitives it exposes on its handles.
//!
//! The bridge only ever talks to a vendor through these traits. Anything
//! that can register a listener, hand back a [`ListenerId`] and later forget
//! it can be bridged.
//!
//! # Thread Safety
//!
//! Listeners are invoked on a thread chosen by the vendor, so every trait here
//! is `Send + Sync`.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::types::{DataSnapshot, ListenerId, VendorError};

/// Callbacks for value events on a location.
pub trait ValueEventListener: Send + Sync {
    /// The data at the location changed, or its initial value arrived.
    fn on_data_change(&self, snapshot: DataSnapshot);

    /// The vendor cancelled the listener. No further callbacks follow.
    fn on_cancelled(&self, error: VendorError);
}

/// Callbacks for events on the children of a location.
pub trait ChildEventListener: Send + Sync {
    fn on_child_added(&self, snapshot: DataSnapshot, previous_child_name: Option<String>);

    fn on_child_changed(&self, snapshot: DataSnapshot, previous_child_name: Option<String>);

    fn on_child_removed(&self, snapshot: DataSnapshot);

    fn on_child_moved(&self, snapshot: DataSnapshot, previous_child_name: Option<String>);

    /// The vendor cancelled the listener. No further callbacks follow.
    fn on_cancelled(&self, error: VendorError);
}

/// A location or query in the external store that listeners can attach to.
///
/// The bridge never owns the data behind a query, it only references it.
pub trait Query: Send + Sync {
    /// Attach a listener that is called for every change of the location.
    fn add_value_event_listener(&self, listener: Arc<dyn ValueEventListener>) -> ListenerId;

    /// Attach a listener that is called once and then forgotten by the vendor.
    fn add_listener_for_single_value_event(
        &self,
        listener: Arc<dyn ValueEventListener>,
    ) -> ListenerId;

    /// Attach a listener for child additions, changes, removals and moves.
    fn add_child_event_listener(&self, listener: Arc<dyn ChildEventListener>) -> ListenerId;

    /// Detach a listener.
    ///
    /// Must be a no-op when the id is unknown, already removed, or the
    /// connection behind the query is gone.
    fn remove_event_listener(&self, id: ListenerId);
}

/// A writable location in the external store.
pub trait DatabaseReference: Query {
    /// Last path segment of the location, `None` for the root.
    fn key(&self) -> Option<String>;

    /// Location at a slash-separated path relative to this one.
    fn child(&self, path: &str) -> Arc<dyn DatabaseReference>;

    /// Root location of the database this reference belongs to.
    fn root(&self) -> Arc<dyn DatabaseReference>;

    /// Create a child location with a vendor-generated, chronologically
    /// ordered key. Nothing is written.
    fn push(&self) -> Arc<dyn DatabaseReference>;

    /// Replace the data at the location. `Value::Null` deletes it.
    ///
    /// Returns the error the client reports when it rejects the write, the
    /// way the vendor's completion listener would.
    fn set_value(&self, value: Value) -> Result<(), VendorError>;

    /// Write several children at once. Keys may be relative paths.
    fn update_children(&self, data: Map<String, Value>) -> Result<(), VendorError>;
}
