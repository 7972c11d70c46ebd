//! # rtdb-auth
//!
//! Cancellable streams over the callback-based authentication API of a
//! realtime-database client.
//!
//! ## Overview
//!
//! The client is reached through the [`AuthClient`] trait. [`RxAuth`] turns
//! its one-shot sign-in callbacks and its auth-state listeners into
//! [`EventStream`](rtdb_stream::EventStream)s:
//!
//! - **Sign-in** streams yield the signed-in [`User`] once, then complete.
//! - **Sign-out** streams yield `true` once the auth state reports no user.
//! - **Auth-state** streams yield the user on every change and end with
//!   [`AuthError::SignedOut`] when the user goes away.
//!
//! Auth-state listeners are attached on first poll and removed when the
//! stream terminates or is dropped. Vendor errors go through the same
//! classifier as database errors.

pub mod client;
pub mod error;
pub mod rx_auth;

pub use client::{AuthClient, AuthCredential, AuthStateListener, SignInCallback, User};
pub use error::{AuthError, Result};
pub use rx_auth::RxAuth;
