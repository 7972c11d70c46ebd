//! Handles to locations in a [`MemoryDatabase`]

use std::fmt;
use std::sync::Arc;

use rtdb_stream::{
    ChildEventListener, DatabaseReference, ListenerId, Query, ValueEventListener, VendorError,
};
use serde_json::{Map, Value};
use tracing::warn;

use crate::database::{Attach, MemoryDatabase};
use crate::error::Result;
use crate::path::Path;

/// A location in a [`MemoryDatabase`]
///
/// Implements the listener and write traits the stream bridge consumes.
/// The trait write methods report rejected writes as [`VendorError`]s; use
/// [`try_set_value`](Self::try_set_value) and
/// [`try_update_children`](Self::try_update_children) for the typed error.
#[derive(Clone)]
pub struct MemoryReference {
    db: MemoryDatabase,
    path: Path,
}

impl MemoryReference {
    pub(crate) fn new(db: MemoryDatabase, path: Path) -> Self {
        Self { db, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Location `relative` below this one.
    pub fn at(&self, relative: &str) -> MemoryReference {
        MemoryReference::new(self.db.clone(), self.path.child(relative))
    }

    /// Current value, `Null` when empty.
    pub fn value(&self) -> Value {
        self.db.value(&self.path.to_string())
    }

    /// Replace the value, reporting rejected writes.
    pub fn try_set_value(&self, value: Value) -> Result<()> {
        self.db.write(vec![(self.path.clone(), value)])
    }

    /// Write several children atomically, reporting rejected writes.
    ///
    /// Keys may be relative paths such as `"posts/p1/title"`.
    pub fn try_update_children(&self, data: Map<String, Value>) -> Result<()> {
        let writes = data
            .into_iter()
            .map(|(relative, value)| (self.path.child(&relative), value))
            .collect();
        self.db.write(writes)
    }

    /// Child with a generated key. Nothing is written.
    pub fn push_child(&self) -> MemoryReference {
        self.at(&self.db.generate_push_id())
    }
}

impl Query for MemoryReference {
    fn add_value_event_listener(&self, listener: Arc<dyn ValueEventListener>) -> ListenerId {
        self.db.attach(self.path.clone(), Attach::Value(listener))
    }

    fn add_listener_for_single_value_event(
        &self,
        listener: Arc<dyn ValueEventListener>,
    ) -> ListenerId {
        self.db.attach(self.path.clone(), Attach::Single(listener))
    }

    fn add_child_event_listener(&self, listener: Arc<dyn ChildEventListener>) -> ListenerId {
        self.db.attach(self.path.clone(), Attach::Child(listener))
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.db.detach(id);
    }
}

impl DatabaseReference for MemoryReference {
    fn key(&self) -> Option<String> {
        self.path.key().map(str::to_string)
    }

    fn child(&self, path: &str) -> Arc<dyn DatabaseReference> {
        Arc::new(self.at(path))
    }

    fn root(&self) -> Arc<dyn DatabaseReference> {
        Arc::new(self.db.root())
    }

    fn push(&self) -> Arc<dyn DatabaseReference> {
        Arc::new(self.push_child())
    }

    fn set_value(&self, value: Value) -> std::result::Result<(), VendorError> {
        self.try_set_value(value).map_err(|e| {
            warn!("Rejected write at {}: {}", self.path, e);
            e.to_vendor_error()
        })
    }

    fn update_children(&self, data: Map<String, Value>) -> std::result::Result<(), VendorError> {
        self.try_update_children(data).map_err(|e| {
            warn!("Rejected update at {}: {}", self.path, e);
            e.to_vendor_error()
        })
    }
}

impl fmt::Debug for MemoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryReference")
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for MemoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory://{}", self.path)
    }
}
