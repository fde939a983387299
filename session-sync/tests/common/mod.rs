//! Shared fixtures for session-sync integration tests.
//!
//! Wires a session manager to fully in-memory collaborators: mock identity
//! provider, recording backend, in-memory flag store and in-process
//! broadcast transport.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use session_sync::config::SyncConfig;
use session_sync::models::{Identity, SessionState};
use session_sync::services::{
    InMemoryFlagStore, InProcessBroadcast, MockIdentityProvider, MockSessionBackend, Navigator,
    SessionDeps, SessionManager,
};
use std::sync::{Arc, Mutex};

pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self {
            visits: Mutex::new(Vec::new()),
        }
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, location: &str) {
        self.visits.lock().unwrap().push(location.to_string());
    }
}

pub struct Harness {
    pub provider: Arc<MockIdentityProvider>,
    pub backend: Arc<MockSessionBackend>,
    pub store: Arc<InMemoryFlagStore>,
    pub transport: Arc<InProcessBroadcast>,
    pub navigator: Arc<RecordingNavigator>,
    pub manager: SessionManager,
}

impl Harness {
    pub fn spawn() -> Self {
        Self::spawn_with(Arc::new(InProcessBroadcast::new()))
    }

    /// Spawn against a shared transport so several harnesses act as tabs of
    /// the same origin.
    pub fn spawn_with(transport: Arc<InProcessBroadcast>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();

        let provider = Arc::new(MockIdentityProvider::new());
        let backend = Arc::new(MockSessionBackend::new());
        let store = Arc::new(InMemoryFlagStore::new());
        let navigator = Arc::new(RecordingNavigator::new());

        let manager = SessionManager::spawn(
            SessionDeps {
                provider: provider.clone(),
                backend: backend.clone(),
                flag_store: store.clone(),
                transport: transport.clone(),
                navigator: navigator.clone(),
            },
            SyncConfig::default(),
        );

        Self {
            provider,
            backend,
            store,
            transport,
            navigator,
            manager,
        }
    }

    /// Wait (bounded) for the published state to satisfy the predicate.
    pub async fn wait_for(&self, pred: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.manager.subscribe();
        let state = tokio::time::timeout(std::time::Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("timed out waiting for session state")
            .expect("session actor stopped")
            .clone();
        state
    }

    /// Let in-flight events drain before asserting a negative.
    pub async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    /// Sign in `user_id` the way the real provider would: raw auth event,
    /// guard validation, listener arming.
    pub async fn authenticate(&self, user_id: &str, token: &str) {
        self.provider
            .emit_state_change(Some(identity(user_id, token)));
        self.wait_for(|s| s.is_authenticated()).await;
    }
}

pub fn identity(user_id: &str, token: &str) -> Identity {
    Identity::new(user_id, token, Utc::now() + Duration::hours(1))
}

/// Epoch millis offset from now; negative offsets produce stale flags.
pub fn flag_millis(offset_ms: i64) -> f64 {
    (Utc::now().timestamp_millis() + offset_ms) as f64
}
