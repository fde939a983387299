//! Services layer for session-sync.
//!
//! Seams for the identity provider, session backend and remote flag store,
//! plus the session manager actor that composes them.

pub mod backend;
pub mod broadcast;
pub mod error;
pub mod flag_store;
pub mod logout_listener;
pub mod manager;
pub mod provider;
pub mod refresh_guard;

pub use backend::{BackendCall, HttpSessionBackend, MockSessionBackend, SessionBackend};
pub use broadcast::{BridgeSubscription, BroadcastTransport, CrossTabBridge, InProcessBroadcast};
pub use error::SessionError;
pub use flag_store::{FlagSubscription, FlagValue, InMemoryFlagStore, RemoteFlagStore};
pub use logout_listener::RemoteLogoutListener;
pub use manager::{
    Navigator, NoopNavigator, SessionCommand, SessionDeps, SessionEvent, SessionManager,
};
pub use provider::{IdentityProvider, MockIdentityProvider};
pub use refresh_guard::TokenRefreshGuard;
