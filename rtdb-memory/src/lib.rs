//! In-memory realtime database client
//!
//! A reference implementation of the listener traits consumed by
//! `rtdb-stream` and `rtdb-auth`, for tests and for applications that want
//! to exercise the bridges without a network service.
//!
//! # Features
//!
//! - **JSON tree**: writing `null` deletes, empty objects are pruned
//! - **Value, single-value and child listeners** with change detection
//! - **Push keys**: 20-character, chronologically sortable child keys
//! - **Connection flag** at `.info/connected`
//! - **Access rules** that cancel listeners and reject writes
//! - **Auth client** with accounts, custom tokens and failure switches
//!
//! # Quick Start
//!
//! ```rust
//! use rtdb_memory::MemoryDatabase;
//! use serde_json::json;
//!
//! let db = MemoryDatabase::new();
//! let post = db.reference("posts/p1");
//! post.try_set_value(json!({ "title": "x" })).unwrap();
//!
//! assert_eq!(db.value("posts/p1/title"), json!("x"));
//!
//! // Deleting the only post removes the parent too
//! post.try_set_value(json!(null)).unwrap();
//! assert_eq!(db.value("posts"), json!(null));
//! ```
//!
//! # Architecture
//!
//! ```text
//! MemoryDatabase (Arc, cloneable)
//!     │
//!     └── Mutex<State>
//!             ├── data: serde_json::Value
//!             ├── connected: bool          (.info/connected)
//!             ├── rules: [(Path, VendorError)]
//!             └── listeners: ListenerId -> (Path, listener)
//!
//! write ─▶ delivery lock ─▶ state lock ─▶ snapshot affected listeners
//!       ─▶ mutate ─▶ diff ─▶ unlock state ─▶ callbacks in mutation order
//! ```

pub mod auth;
pub mod database;
mod dispatch;
pub mod error;
pub mod path;
pub mod push_id;
pub mod reference;
pub mod tree;

pub use auth::MemoryAuth;
pub use database::{MemoryDatabase, CONNECTED_PATH};
pub use error::{MemoryError, Result};
pub use path::Path;
pub use push_id::PushIdGenerator;
pub use reference::MemoryReference;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::auth::MemoryAuth;
    pub use crate::database::MemoryDatabase;
    pub use crate::reference::MemoryReference;
}
