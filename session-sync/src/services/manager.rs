use crate::config::SyncConfig;
use crate::models::{Identity, SessionState};
use crate::services::{
    BridgeSubscription, BroadcastTransport, CrossTabBridge, IdentityProvider, RemoteFlagStore,
    RemoteLogoutListener, SessionBackend, SessionError, TokenRefreshGuard,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Side-effect seam for the optional post-sign-out navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &str);
}

/// Default navigator: stay where we are.
#[derive(Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _location: &str) {}
}

/// Everything that can move the state machine. All entry points funnel into
/// one queue, so transitions are serialized by construction.
#[derive(Debug)]
pub enum SessionEvent {
    /// Raw auth event from the identity provider.
    AuthStateChanged(Option<Identity>),
    /// The remote logout listener saw a fresh flag.
    RemoteLogoutDetected,
    /// Another tab broadcast a logout. Untrusted events come from the
    /// fallback channel and must be re-validated before acting.
    CrossTabLogout { trusted: bool },
    Command(SessionCommand),
}

#[derive(Debug)]
pub enum SessionCommand {
    SignIn {
        reply: oneshot::Sender<Result<Identity, SessionError>>,
    },
    SignOut {
        reply: oneshot::Sender<()>,
    },
    SignOutEverywhere {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown,
}

/// External collaborators, injected so the whole machine runs against fakes
/// in tests.
pub struct SessionDeps {
    pub provider: Arc<dyn IdentityProvider>,
    pub backend: Arc<dyn SessionBackend>,
    pub flag_store: Arc<dyn RemoteFlagStore>,
    pub transport: Arc<dyn BroadcastTransport>,
    pub navigator: Arc<dyn Navigator>,
}

/// Handle to the session state machine.
///
/// The state itself lives in a single actor task; this handle sends
/// commands and observes the published state. Cloning is cheap.
#[derive(Clone)]
pub struct SessionManager {
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionManager {
    /// Spawn the actor and wire up the provider event stream and the
    /// cross-tab receivers.
    pub fn spawn(deps: SessionDeps, config: SyncConfig) -> SessionManager {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::SignedOut);

        // Provider auth events feed the same queue as everything else.
        let mut provider_rx = deps.provider.subscribe_state_changes();
        let provider_events = events_tx.clone();
        tokio::spawn(async move {
            while let Some(identity) = provider_rx.recv().await {
                if provider_events
                    .send(SessionEvent::AuthStateChanged(identity))
                    .is_err()
                {
                    break;
                }
            }
        });

        let bridge = CrossTabBridge::new(
            Arc::clone(&deps.transport),
            config.broadcast_channel.as_str(),
        );
        let bridge_subscription = bridge.listen(events_tx.clone());

        let listener = RemoteLogoutListener::new(
            Arc::clone(&deps.flag_store),
            config.logout_flag_prefix.as_str(),
        );
        let guard = TokenRefreshGuard::new(Arc::clone(&deps.provider));

        let actor = SessionActor {
            deps,
            config,
            guard,
            listener,
            bridge,
            bridge_subscription,
            state_tx,
            events_tx: events_tx.clone(),
        };
        tokio::spawn(actor.run(events_rx));

        SessionManager {
            events_tx,
            state_rx,
        }
    }

    /// Current state, read synchronously.
    pub fn current_state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Projection of the current state to `Identity | None`.
    pub fn current_identity(&self) -> Option<Identity> {
        self.state_rx.borrow().identity().cloned()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Open the provider's interactive sign-in flow and notify the backend.
    ///
    /// Only provider failures surface here; a backend notify failure is
    /// logged and the local sign-in stands.
    pub async fn sign_in_with_provider(&self) -> Result<Identity, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Command(SessionCommand::SignIn { reply }))?;
        rx.await
            .map_err(|_| SessionError::Internal(anyhow::anyhow!("session actor stopped")))?
    }

    /// Sign out this device. Always completes locally regardless of the
    /// backend call's outcome.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Command(SessionCommand::SignOut { reply }))?;
        rx.await
            .map_err(|_| SessionError::Internal(anyhow::anyhow!("session actor stopped")))
    }

    /// Write the logout flag so every other device of this user signs out.
    /// Does not change this device's state.
    pub async fn sign_out_everywhere(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Command(SessionCommand::SignOutEverywhere {
            reply,
        }))?;
        rx.await
            .map_err(|_| SessionError::Internal(anyhow::anyhow!("session actor stopped")))?
    }

    /// Stop the actor. Pending commands are dropped.
    pub fn shutdown(&self) {
        let _ = self
            .events_tx
            .send(SessionEvent::Command(SessionCommand::Shutdown));
    }

    fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events_tx
            .send(event)
            .map_err(|_| SessionError::Internal(anyhow::anyhow!("session actor stopped")))
    }
}

struct SessionActor {
    deps: SessionDeps,
    config: SyncConfig,
    guard: TokenRefreshGuard,
    listener: RemoteLogoutListener,
    bridge: CrossTabBridge,
    bridge_subscription: BridgeSubscription,
    state_tx: watch::Sender<SessionState>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionActor {
    async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::AuthStateChanged(Some(identity)) => {
                    self.on_provider_identity(identity).await;
                }
                SessionEvent::AuthStateChanged(None) => {
                    self.on_provider_signed_out();
                }
                SessionEvent::RemoteLogoutDetected => {
                    self.on_remote_logout().await;
                }
                SessionEvent::CrossTabLogout { trusted } => {
                    self.on_cross_tab_logout(trusted).await;
                }
                SessionEvent::Command(SessionCommand::SignIn { reply }) => {
                    let _ = reply.send(self.on_sign_in().await);
                }
                SessionEvent::Command(SessionCommand::SignOut { reply }) => {
                    self.on_sign_out().await;
                    let _ = reply.send(());
                }
                SessionEvent::Command(SessionCommand::SignOutEverywhere { reply }) => {
                    let _ = reply.send(self.on_sign_out_everywhere().await);
                }
                SessionEvent::Command(SessionCommand::Shutdown) => break,
            }
        }

        self.listener.disarm();
        self.bridge_subscription.release();
        tracing::debug!("Session actor stopped");
    }

    fn set_state(&self, next: SessionState) {
        self.state_tx.send_replace(next);
    }

    fn current(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// The provider reported a signed-in identity: validate it, then arm
    /// the remote logout listener.
    async fn on_provider_identity(&mut self, identity: Identity) {
        self.set_state(SessionState::Transitioning);

        match self.guard.validate(&identity).await {
            Ok(refreshed) => {
                if let Err(e) = self
                    .listener
                    .arm(&refreshed.user_id, self.events_tx.clone())
                    .await
                {
                    tracing::warn!(user_id = %refreshed.user_id, error = %e, "Failed to arm logout listener");
                }
                tracing::info!(user_id = %refreshed.user_id, "Session authenticated");
                self.set_state(SessionState::Authenticated(refreshed));
            }
            Err(_) => {
                // Revoked out from under us: no backend calls with the
                // stale token, just force a full local sign-out.
                self.listener.disarm();
                self.deps.provider.sign_out_local().await;
                self.set_state(SessionState::SignedOut);
            }
        }
    }

    fn on_provider_signed_out(&mut self) {
        self.listener.disarm();
        self.set_state(SessionState::SignedOut);
    }

    async fn on_sign_in(&mut self) -> Result<Identity, SessionError> {
        let previous = self.current();
        self.set_state(SessionState::Transitioning);

        match self.deps.provider.sign_in_interactive().await {
            Ok(identity) => {
                // Best-effort: the server session cookie is advisory, local
                // state wins.
                if let Err(e) = self.deps.backend.notify_sign_in(&identity.id_token).await {
                    tracing::warn!(user_id = %identity.user_id, error = %e, "Backend sign-in notify failed");
                }
                self.set_state(SessionState::Authenticated(identity.clone()));
                Ok(identity)
            }
            Err(e) => {
                // Surfaced to the caller; local state unchanged.
                self.set_state(previous);
                Err(e)
            }
        }
    }

    async fn on_sign_out(&mut self) {
        self.set_state(SessionState::Transitioning);

        let token = self
            .deps
            .provider
            .current_identity()
            .await
            .map(|identity| identity.id_token);

        if let Err(e) = self.deps.backend.notify_sign_out(token.as_deref()).await {
            tracing::warn!(error = %e, "Backend sign-out notify failed");
        }

        self.bridge.broadcast_logout();
        self.finish_local_sign_out().await;
    }

    /// A fresh logout flag from another device. The backend sign-out
    /// already happened on the originating device; only local teardown is
    /// needed here.
    async fn on_remote_logout(&mut self) {
        if !self.current().is_authenticated() {
            return;
        }

        tracing::info!("Remote logout detected, signing out locally");
        self.set_state(SessionState::Transitioning);
        self.finish_local_sign_out().await;
    }

    async fn on_cross_tab_logout(&mut self, trusted: bool) {
        let SessionState::Authenticated(identity) = self.current() else {
            return;
        };

        // Fallback channel has no origin guarantee: only act if the
        // session really is gone.
        if !trusted && self.guard.validate(&identity).await.is_ok() {
            tracing::debug!("Ignoring fallback logout message, session still valid");
            return;
        }

        tracing::info!(trusted, "Cross-tab logout received");
        self.set_state(SessionState::Transitioning);
        self.finish_local_sign_out().await;
    }

    async fn on_sign_out_everywhere(&mut self) -> Result<(), SessionError> {
        let Some(identity) = self.deps.provider.current_identity().await else {
            return Err(SessionError::Provider(anyhow::anyhow!(
                "no signed-in user to sign out everywhere"
            )));
        };

        self.deps
            .backend
            .set_logout_flag(&identity.id_token)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %identity.user_id, error = %e, "Failed to set logout flag");
                e
            })?;

        tracing::info!(user_id = %identity.user_id, "Logout flag set for all devices");
        Ok(())
    }

    async fn finish_local_sign_out(&mut self) {
        self.deps.provider.sign_out_local().await;
        self.listener.disarm();
        self.set_state(SessionState::SignedOut);
        self.deps.navigator.navigate(&self.config.landing_url);
    }
}
