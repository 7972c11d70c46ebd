//! # rtdb-stream
//!
//! Cancellable event streams over the callback-based listener API of a
//! realtime-database client.
//!
//! The client is reached only through the [`Query`] and [`DatabaseReference`]
//! traits, so any implementation that can register a listener, return a
//! [`ListenerId`] and later remove it can be bridged. Vendor errors are
//! classified into a closed set of [`ErrorKind`]s before they reach the
//! consumer.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use rtdb_stream::{BridgeConfig, RxDatabase};
//!
//! let db = RxDatabase::new(BridgeConfig::default())?;
//! let mut posts = db.observe_child_added(client.child("posts"));
//!
//! // The listener is attached on the first poll...
//! while let Some(event) = posts.next().await {
//!     match event {
//!         Ok(event) => println!("new post {:?}", event.snapshot().key()),
//!         Err(e) => eprintln!("listener cancelled: {}", e),
//!     }
//! }
//! // ...and removed when the stream ends or is dropped.
//! ```
//!
//! # Architecture
//!
//! ```text
//! vendor thread                          consumer task
//!      │                                      │
//!  ValueEventListener ── Emitter ──▶ queue ──▶ EventStream (futures::Stream)
//!      ▲                   │                  │
//!      └── remove_event_listener ◀── teardown ◀── drop / terminal signal
//! ```

pub mod config;
pub mod database;
pub mod emitter;
pub mod error;
pub mod listener;
pub mod logging;
pub mod stream;
pub mod types;

pub use config::{Backpressure, BridgeConfig};
pub use database::{RxDatabase, CONNECTION_STATE_PATH};
pub use emitter::Emitter;
pub use error::{classify, classify_code, BridgeError, ErrorKind, Result, StreamError};
pub use listener::{ChildEventListener, DatabaseReference, Query, ValueEventListener};
pub use stream::{BlockingIter, EventStream, FilteredEventStream, StreamStats, SubscribeFn};
pub use types::{
    ChildEvent, ChildEventKind, DataSnapshot, ErrorCode, ListenerId, ParseErrorCodeError,
    VendorError,
};

/// Commonly used items
pub mod prelude {
    pub use crate::config::{Backpressure, BridgeConfig};
    pub use crate::database::RxDatabase;
    pub use crate::error::{ErrorKind, StreamError};
    pub use crate::listener::{DatabaseReference, Query};
    pub use crate::stream::EventStream;
    pub use crate::types::{ChildEvent, ChildEventKind, DataSnapshot};
}
