use crate::services::manager::SessionEvent;
use crate::services::{FlagSubscription, RemoteFlagStore, SessionError};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Detects "sign out everywhere" actions initiated from other devices.
///
/// Single-shot per arm cycle: the first flag whose timestamp is strictly
/// greater than the arm instant fires `RemoteLogoutDetected` exactly once,
/// then the listener disarms itself. The time gate is what keeps a flag
/// written before this device's session began (and replayed on subscribe)
/// from causing a spurious sign-out loop.
pub struct RemoteLogoutListener {
    store: Arc<dyn RemoteFlagStore>,
    flag_prefix: String,
    active: Option<ArmedListener>,
}

struct ArmedListener {
    armed_at: i64,
    subscription: Arc<Mutex<Option<FlagSubscription>>>,
    task: JoinHandle<()>,
}

impl RemoteLogoutListener {
    pub fn new(store: Arc<dyn RemoteFlagStore>, flag_prefix: impl Into<String>) -> Self {
        Self {
            store,
            flag_prefix: flag_prefix.into(),
            active: None,
        }
    }

    /// Whether a subscription is currently live. Goes false again once the
    /// single-shot watcher fires and releases it.
    pub fn is_armed(&self) -> bool {
        self.active
            .as_ref()
            .map_or(false, |armed| lock(&armed.subscription).is_some())
    }

    /// Arm instant (epoch millis) of the current cycle, if still armed.
    pub fn armed_at(&self) -> Option<i64> {
        self.active
            .as_ref()
            .filter(|armed| lock(&armed.subscription).is_some())
            .map(|armed| armed.armed_at)
    }

    /// Subscribe to the user's logout flag, releasing any previous
    /// subscription first (at most one may be active).
    pub async fn arm(
        &mut self,
        user_id: &str,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), SessionError> {
        self.disarm();

        let armed_at = Utc::now().timestamp_millis();
        let key = format!("{}/{}", self.flag_prefix, user_id);
        let (tx, rx) = mpsc::unbounded_channel();

        let subscription = self.store.subscribe(&key, tx).await?;
        let subscription = Arc::new(Mutex::new(Some(subscription)));

        tracing::debug!(key = %key, armed_at, "Logout listener armed");

        let task_subscription = Arc::clone(&subscription);
        let task = tokio::spawn(watch_flags(rx, armed_at, events_tx, task_subscription));

        self.active = Some(ArmedListener {
            armed_at,
            subscription,
            task,
        });
        Ok(())
    }

    /// Idempotent teardown. Unsubscribe failures are logged and swallowed;
    /// they must never block a sign-out flow.
    pub fn disarm(&mut self) {
        if let Some(armed) = self.active.take() {
            armed.task.abort();
            release_subscription(&armed.subscription);
            tracing::debug!("Logout listener disarmed");
        }
    }
}

impl Drop for RemoteLogoutListener {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn watch_flags(
    mut rx: mpsc::UnboundedReceiver<crate::services::FlagValue>,
    armed_at: i64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    subscription: Arc<Mutex<Option<FlagSubscription>>>,
) {
    while let Some(value) = rx.recv().await {
        let Some(flag_ts) = value.as_epoch_millis() else {
            continue;
        };

        // Strictly greater than the arm instant: stale or already-consumed
        // flags replayed by the store are not logout signals.
        if flag_ts <= armed_at {
            tracing::debug!(flag_ts, armed_at, "Ignoring stale logout flag");
            continue;
        }

        tracing::info!(flag_ts, "Logout flag detected");
        let _ = events_tx.send(SessionEvent::RemoteLogoutDetected);
        release_subscription(&subscription);
        break;
    }
}

fn release_subscription(subscription: &Mutex<Option<FlagSubscription>>) {
    if let Some(sub) = lock(subscription).take() {
        let key = sub.key().to_string();
        if let Err(e) = sub.release() {
            tracing::warn!(key = %key, error = %e, "Logout flag unsubscribe failed");
        }
    }
}
