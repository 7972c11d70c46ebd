//! Core types for the rtdb-stream crate.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Identifier returned by a vendor listener registration.
///
/// The same identifier is handed back to the vendor to deregister the
/// listener. Deregistering an identifier the vendor no longer knows is a no-op.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ListenerId(pub u64);

impl ListenerId {
    /// Create a new listener ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Error code reported by the vendor client.
///
/// The code space is open: vendors may report codes this crate has no name
/// for. Those are still carried through and classify as
/// [`ErrorKind::General`](crate::ErrorKind::General).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const DATA_STALE: ErrorCode = ErrorCode(-1);
    pub const OPERATION_FAILED: ErrorCode = ErrorCode(-2);
    pub const PERMISSION_DENIED: ErrorCode = ErrorCode(-3);
    pub const DISCONNECTED: ErrorCode = ErrorCode(-4);
    pub const EXPIRED_TOKEN: ErrorCode = ErrorCode(-6);
    pub const INVALID_TOKEN: ErrorCode = ErrorCode(-7);
    pub const MAX_RETRIES: ErrorCode = ErrorCode(-8);
    pub const OVERRIDDEN_BY_SET: ErrorCode = ErrorCode(-9);
    pub const UNAVAILABLE: ErrorCode = ErrorCode(-10);
    pub const USER_CODE_EXCEPTION: ErrorCode = ErrorCode(-11);
    pub const AUTH_PROVIDER_DISABLED: ErrorCode = ErrorCode(-12);
    pub const NETWORK_ERROR: ErrorCode = ErrorCode(-24);
    pub const WRITE_CANCELED: ErrorCode = ErrorCode(-25);
    pub const UNKNOWN_ERROR: ErrorCode = ErrorCode(-999);

    const NAMED: [(ErrorCode, &'static str); 14] = [
        (Self::DATA_STALE, "DATA_STALE"),
        (Self::OPERATION_FAILED, "OPERATION_FAILED"),
        (Self::PERMISSION_DENIED, "PERMISSION_DENIED"),
        (Self::DISCONNECTED, "DISCONNECTED"),
        (Self::EXPIRED_TOKEN, "EXPIRED_TOKEN"),
        (Self::INVALID_TOKEN, "INVALID_TOKEN"),
        (Self::MAX_RETRIES, "MAX_RETRIES"),
        (Self::OVERRIDDEN_BY_SET, "OVERRIDDEN_BY_SET"),
        (Self::UNAVAILABLE, "UNAVAILABLE"),
        (Self::USER_CODE_EXCEPTION, "USER_CODE_EXCEPTION"),
        (Self::AUTH_PROVIDER_DISABLED, "AUTH_PROVIDER_DISABLED"),
        (Self::NETWORK_ERROR, "NETWORK_ERROR"),
        (Self::WRITE_CANCELED, "WRITE_CANCELED"),
        (Self::UNKNOWN_ERROR, "UNKNOWN_ERROR"),
    ];

    /// Get the raw code value.
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Vendor name of the code, if it is a known one.
    pub fn name(&self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(code, _)| code == self)
            .map(|(_, name)| *name)
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Error returned when parsing an [`ErrorCode`] from text fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown error code: {0}")]
pub struct ParseErrorCodeError(pub String);

impl FromStr for ErrorCode {
    type Err = ParseErrorCodeError;

    /// Accepts a vendor name (`PERMISSION_DENIED`) or a numeric code (`-3`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(raw) = trimmed.parse::<i32>() {
            return Ok(ErrorCode(raw));
        }
        Self::NAMED
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(trimmed))
            .map(|(code, _)| *code)
            .ok_or_else(|| ParseErrorCodeError(s.to_string()))
    }
}

/// An error as reported by the vendor client through a cancellation callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorError {
    /// Vendor error code
    pub code: ErrorCode,
    /// Human-readable message supplied by the vendor
    pub message: String,
    /// Optional extra detail supplied by the vendor
    pub details: Option<String>,
}

impl VendorError {
    /// Create a new vendor error without details.
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach vendor details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for VendorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for VendorError {}

/// Immutable copy of the data at a location, as handed out by the vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    key: Option<String>,
    value: Value,
}

impl DataSnapshot {
    /// Create a snapshot for the location named `key`. The root has no key.
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self { key, value }
    }

    /// Last path segment of the location, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Raw JSON value at the location. `Value::Null` when nothing is stored.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the snapshot and return its value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Whether any data is stored at the location.
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Deserialize the value into `T`.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }

    /// Snapshot of a direct child. Missing children yield an empty snapshot.
    pub fn child(&self, key: &str) -> DataSnapshot {
        let value = self.value.get(key).cloned().unwrap_or(Value::Null);
        DataSnapshot::new(Some(key.to_string()), value)
    }

    /// Whether a direct child with this key holds data.
    pub fn has_child(&self, key: &str) -> bool {
        self.value.get(key).map_or(false, |v| !v.is_null())
    }

    /// Direct children, ordered by key.
    pub fn children(&self) -> Vec<DataSnapshot> {
        match &self.value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| DataSnapshot::new(Some(k.clone()), map[k].clone()))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Number of direct children.
    pub fn children_count(&self) -> usize {
        self.value.as_object().map_or(0, |map| map.len())
    }
}

/// Tag of a [`ChildEvent`], without its payload.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ChildEventKind {
    /// A child was added under the watched location
    Added,
    /// A child's data changed
    Changed,
    /// A child was removed
    Removed,
    /// A child changed position in the query ordering
    Moved,
}

impl fmt::Display for ChildEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChildEventKind::Added => "added",
            ChildEventKind::Changed => "changed",
            ChildEventKind::Removed => "removed",
            ChildEventKind::Moved => "moved",
        };
        f.write_str(name)
    }
}

/// Notification about a single child of a watched location.
///
/// `previous_child_name` is the key of the sibling ordered immediately
/// before the child, `None` when the child is first. Removal carries no
/// sibling.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    Added {
        snapshot: DataSnapshot,
        previous_child_name: Option<String>,
    },
    Changed {
        snapshot: DataSnapshot,
        previous_child_name: Option<String>,
    },
    Removed {
        snapshot: DataSnapshot,
    },
    Moved {
        snapshot: DataSnapshot,
        previous_child_name: Option<String>,
    },
}

impl ChildEvent {
    /// Tag of this event.
    pub fn kind(&self) -> ChildEventKind {
        match self {
            ChildEvent::Added { .. } => ChildEventKind::Added,
            ChildEvent::Changed { .. } => ChildEventKind::Changed,
            ChildEvent::Removed { .. } => ChildEventKind::Removed,
            ChildEvent::Moved { .. } => ChildEventKind::Moved,
        }
    }

    /// Snapshot of the child the event is about.
    pub fn snapshot(&self) -> &DataSnapshot {
        match self {
            ChildEvent::Added { snapshot, .. }
            | ChildEvent::Changed { snapshot, .. }
            | ChildEvent::Removed { snapshot }
            | ChildEvent::Moved { snapshot, .. } => snapshot,
        }
    }

    /// Key of the preceding sibling. Always `None` for removals.
    pub fn previous_child_name(&self) -> Option<&str> {
        match self {
            ChildEvent::Added { previous_child_name, .. }
            | ChildEvent::Changed { previous_child_name, .. }
            | ChildEvent::Moved { previous_child_name, .. } => previous_child_name.as_deref(),
            ChildEvent::Removed { .. } => None,
        }
    }

    /// Whether the event carries the given tag.
    pub fn is(&self, kind: ChildEventKind) -> bool {
        self.kind() == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_error_code_names_round_trip_through_from_str() {
        assert_eq!("PERMISSION_DENIED".parse::<ErrorCode>().unwrap(), ErrorCode::PERMISSION_DENIED);
        assert_eq!("network_error".parse::<ErrorCode>().unwrap(), ErrorCode::NETWORK_ERROR);
        assert_eq!("-7".parse::<ErrorCode>().unwrap(), ErrorCode::INVALID_TOKEN);
        assert_eq!("-4242".parse::<ErrorCode>().unwrap(), ErrorCode(-4242));
        assert!("NOT_A_CODE".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::EXPIRED_TOKEN.to_string(), "EXPIRED_TOKEN");
        assert_eq!(ErrorCode(12).to_string(), "12");
        assert_eq!(ErrorCode(12).name(), None);
    }

    #[test]
    fn test_vendor_error_display() {
        let error = VendorError::new(ErrorCode::PERMISSION_DENIED, "Denied").with_details("rules");
        assert_eq!(error.to_string(), "Denied (PERMISSION_DENIED)");
        assert_eq!(error.details.as_deref(), Some("rules"));
    }

    #[test]
    fn test_snapshot_children_are_key_ordered() {
        let snapshot = DataSnapshot::new(
            Some("posts".to_string()),
            json!({ "b": { "title": "second" }, "a": { "title": "first" } }),
        );

        let keys: Vec<_> = snapshot
            .children()
            .iter()
            .map(|c| c.key().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(snapshot.children_count(), 2);
        assert!(snapshot.has_child("a"));
        assert!(!snapshot.child("c").exists());
    }

    #[test]
    fn test_snapshot_value_as() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Post {
            title: String,
        }

        let snapshot = DataSnapshot::new(Some("p1".to_string()), json!({ "title": "x" }));
        let post: Post = snapshot.value_as().unwrap();
        assert_eq!(post, Post { title: "x".to_string() });

        let empty = DataSnapshot::new(None, Value::Null);
        assert!(!empty.exists());
        assert!(empty.value_as::<Post>().is_err());
    }

    #[test]
    fn test_child_event_accessors() {
        let snapshot = DataSnapshot::new(Some("k".to_string()), json!(1));
        let added = ChildEvent::Added {
            snapshot: snapshot.clone(),
            previous_child_name: Some("j".to_string()),
        };
        let removed = ChildEvent::Removed { snapshot };

        assert_eq!(added.kind(), ChildEventKind::Added);
        assert_eq!(added.previous_child_name(), Some("j"));
        assert!(removed.is(ChildEventKind::Removed));
        assert_eq!(removed.previous_child_name(), None);
        assert_eq!(removed.snapshot().key(), Some("k"));
    }
}
