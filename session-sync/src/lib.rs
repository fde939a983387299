//! Session lifecycle and cross-device logout synchronization engine.
//!
//! Keeps a client's notion of "who is signed in" consistent with a remote
//! identity provider and a remote session store, detects server-side
//! revocation, and propagates sign-out to other tabs and devices of the
//! same user.

pub mod config;
pub mod models;
pub mod services;

pub use config::SyncConfig;
pub use models::{Identity, SessionState};
pub use services::{SessionError, SessionManager};
