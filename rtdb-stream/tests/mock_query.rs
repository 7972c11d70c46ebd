//! Mock query for integration testing.
//!
//! `MockQuery` records every listener the bridge attaches and lets a test
//! fire callbacks by hand, including child moves, which the in-memory client
//! never produces.

use parking_lot::Mutex;
use rtdb_stream::{
    ChildEventListener, DataSnapshot, ListenerId, Query, ValueEventListener, VendorError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Query double that counts attach and detach calls.
#[derive(Default)]
pub struct MockQuery {
    next_id: AtomicU64,
    attach_count: AtomicU32,
    detach_count: AtomicU32,
    values: Mutex<BTreeMap<ListenerId, Arc<dyn ValueEventListener>>>,
    children: Mutex<BTreeMap<ListenerId, Arc<dyn ChildEventListener>>>,
}

#[allow(dead_code)]
impl MockQuery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of listeners ever attached.
    pub fn attach_count(&self) -> u32 {
        self.attach_count.load(Ordering::SeqCst)
    }

    /// Number of remove_event_listener calls.
    pub fn detach_count(&self) -> u32 {
        self.detach_count.load(Ordering::SeqCst)
    }

    /// Listeners currently attached.
    pub fn active(&self) -> usize {
        self.values.lock().len() + self.children.lock().len()
    }

    pub fn fire_value(&self, key: &str, value: serde_json::Value) {
        let listeners: Vec<_> = self.values.lock().values().cloned().collect();
        for listener in listeners {
            listener.on_data_change(DataSnapshot::new(Some(key.to_string()), value.clone()));
        }
    }

    pub fn fire_moved(&self, key: &str, previous: Option<&str>) {
        let listeners: Vec<_> = self.children.lock().values().cloned().collect();
        for listener in listeners {
            listener.on_child_moved(
                DataSnapshot::new(Some(key.to_string()), serde_json::Value::Null),
                previous.map(str::to_string),
            );
        }
    }

    pub fn fire_added(&self, key: &str, previous: Option<&str>) {
        let listeners: Vec<_> = self.children.lock().values().cloned().collect();
        for listener in listeners {
            listener.on_child_added(
                DataSnapshot::new(Some(key.to_string()), serde_json::json!(true)),
                previous.map(str::to_string),
            );
        }
    }

    /// Cancel every attached listener. The vendor forgets them afterwards.
    pub fn cancel_all(&self, error: VendorError) {
        let values: Vec<_> = std::mem::take(&mut *self.values.lock()).into_values().collect();
        let children: Vec<_> = std::mem::take(&mut *self.children.lock()).into_values().collect();
        for listener in values {
            listener.on_cancelled(error.clone());
        }
        for listener in children {
            listener.on_cancelled(error.clone());
        }
    }

    fn next_id(&self) -> ListenerId {
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        ListenerId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Query for MockQuery {
    fn add_value_event_listener(&self, listener: Arc<dyn ValueEventListener>) -> ListenerId {
        let id = self.next_id();
        self.values.lock().insert(id, listener);
        id
    }

    fn add_listener_for_single_value_event(
        &self,
        listener: Arc<dyn ValueEventListener>,
    ) -> ListenerId {
        self.add_value_event_listener(listener)
    }

    fn add_child_event_listener(&self, listener: Arc<dyn ChildEventListener>) -> ListenerId {
        let id = self.next_id();
        self.children.lock().insert(id, listener);
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.detach_count.fetch_add(1, Ordering::SeqCst);
        self.values.lock().remove(&id);
        self.children.lock().remove(&id);
    }
}
