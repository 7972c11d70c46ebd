//! JSON tree storage
//!
//! The database is a single `serde_json::Value`. Stored trees are kept
//! normalized: no `null` leaves, no empty objects, and arrays stored as
//! objects keyed by index. Writing `null` therefore deletes, and deleting the
//! last child of a node removes the node.

use std::collections::BTreeSet;

use rtdb_stream::{ChildEvent, DataSnapshot};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::path::{validate_key, Path};

/// Value stored at `path`, `Null` when absent.
pub fn get(root: &Value, path: &Path) -> Value {
    let mut node = root;
    for segment in path.segments() {
        match node.get(segment.as_str()) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

/// Replace the value at `path`, creating or pruning parents as needed.
pub fn set(root: &mut Value, path: &Path, value: Value) {
    set_segments(root, path.segments(), normalize(value));
}

fn set_segments(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    let now_empty = match node {
        Value::Object(map) => {
            let child_empty = {
                let child = map.entry(first.clone()).or_insert(Value::Null);
                set_segments(child, rest, value);
                child.is_null()
            };
            if child_empty {
                map.remove(first.as_str());
            }
            map.is_empty()
        }
        _ => false,
    };

    if now_empty {
        *node = Value::Null;
    }
}

/// Drop `null` members and empty objects; store arrays as index-keyed objects.
pub fn normalize(value: Value) -> Value {
    let map: Map<String, Value> = match value {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item))
            .collect(),
        scalar => return scalar,
    };

    let normalized: Map<String, Value> = map
        .into_iter()
        .map(|(key, child)| (key, normalize(child)))
        .filter(|(_, child)| !child.is_null())
        .collect();

    if normalized.is_empty() {
        Value::Null
    } else {
        Value::Object(normalized)
    }
}

/// Check every object key in `value` may be stored.
pub fn validate(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => map.iter().try_for_each(|(key, child)| {
            validate_key(key)?;
            validate(child)
        }),
        Value::Array(items) => items.iter().try_for_each(validate),
        _ => Ok(()),
    }
}

/// Child events turning the children of `old` into the children of `new`,
/// in key order.
///
/// The previous sibling of an added or changed child is its predecessor in
/// the new ordering.
pub fn child_events(old: &Value, new: &Value) -> Vec<ChildEvent> {
    let empty = Map::new();
    let old_children = old.as_object().unwrap_or(&empty);
    let new_children = new.as_object().unwrap_or(&empty);

    let mut new_keys: Vec<&String> = new_children.keys().collect();
    new_keys.sort();
    let keys: BTreeSet<&String> = old_children.keys().chain(new_children.keys()).collect();

    let mut events = Vec::new();
    for key in keys {
        let snapshot = |value: &Value| DataSnapshot::new(Some(key.clone()), value.clone());
        match (old_children.get(key), new_children.get(key)) {
            (Some(before), None) => events.push(ChildEvent::Removed {
                snapshot: snapshot(before),
            }),
            (None, Some(after)) => events.push(ChildEvent::Added {
                snapshot: snapshot(after),
                previous_child_name: previous_key(&new_keys, key),
            }),
            (Some(before), Some(after)) if before != after => events.push(ChildEvent::Changed {
                snapshot: snapshot(after),
                previous_child_name: previous_key(&new_keys, key),
            }),
            _ => {}
        }
    }
    events
}

fn previous_key(sorted: &[&String], key: &str) -> Option<String> {
    let index = sorted.iter().position(|k| k.as_str() == key)?;
    index.checked_sub(1).map(|i| sorted[i].clone())
}
