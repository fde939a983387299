use crate::models::Identity;
use crate::services::SessionError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Seam over the external identity provider (popup-based third-party
/// sign-in, short-lived bearer tokens).
///
/// Implementations must emit a state-change event after a successful
/// interactive sign-in and after a local sign-out, mirroring the provider's
/// own auth-state callback.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Open the provider's interactive sign-in flow.
    async fn sign_in_interactive(&self) -> Result<Identity, SessionError>;

    /// Force-refresh the bearer token. Fails with [`SessionError::Revoked`]
    /// when the underlying account or session no longer exists.
    async fn force_refresh(&self, identity: &Identity) -> Result<Identity, SessionError>;

    /// Clear the provider's local state. Never fails from the caller's
    /// perspective.
    async fn sign_out_local(&self);

    /// The provider's current signed-in identity, if any.
    async fn current_identity(&self) -> Option<Identity>;

    /// Subscribe to raw auth-state events (`Some` on sign-in, `None` on
    /// sign-out). Each call returns an independent receiver.
    fn subscribe_state_changes(&self) -> mpsc::UnboundedReceiver<Option<Identity>>;
}

/// In-memory provider for tests: scripted sign-in results, a revocation
/// toggle for `force_refresh`, and manual event emission.
#[derive(Default)]
pub struct MockIdentityProvider {
    identity: Mutex<Option<Identity>>,
    revoked: AtomicBool,
    next_sign_in: Mutex<Option<Result<Identity, SessionError>>>,
    local_sign_outs: AtomicUsize,
    refresh_calls: AtomicUsize,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<Identity>>>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of the next `sign_in_interactive` call.
    pub fn script_sign_in(&self, result: Result<Identity, SessionError>) {
        *lock(&self.next_sign_in) = Some(result);
    }

    /// Make subsequent `force_refresh` calls report a revoked session.
    pub fn set_revoked(&self, revoked: bool) {
        self.revoked.store(revoked, Ordering::SeqCst);
    }

    /// Emit a raw auth-state event to all subscribers, as the real provider
    /// does on its own state changes.
    pub fn emit_state_change(&self, identity: Option<Identity>) {
        *lock(&self.identity) = identity.clone();
        self.notify(identity);
    }

    pub fn local_sign_out_count(&self) -> usize {
        self.local_sign_outs.load(Ordering::SeqCst)
    }

    pub fn refresh_call_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn notify(&self, identity: Option<Identity>) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(identity.clone()).is_ok());
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_in_interactive(&self) -> Result<Identity, SessionError> {
        let scripted = lock(&self.next_sign_in).take();
        match scripted {
            Some(Ok(identity)) => {
                self.emit_state_change(Some(identity.clone()));
                Ok(identity)
            }
            Some(Err(e)) => Err(e),
            None => Err(SessionError::Provider(anyhow::anyhow!(
                "no scripted sign-in result"
            ))),
        }
    }

    async fn force_refresh(&self, identity: &Identity) -> Result<Identity, SessionError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.revoked.load(Ordering::SeqCst) {
            return Err(SessionError::Revoked);
        }
        Ok(identity.clone())
    }

    async fn sign_out_local(&self) {
        self.local_sign_outs.fetch_add(1, Ordering::SeqCst);
        let had_identity = lock(&self.identity).take().is_some();
        if had_identity {
            self.notify(None);
        }
    }

    async fn current_identity(&self) -> Option<Identity> {
        lock(&self.identity).clone()
    }

    fn subscribe_state_changes(&self) -> mpsc::UnboundedReceiver<Option<Identity>> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }
}
