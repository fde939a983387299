use crate::services::SessionError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Values below this are treated as second-resolution timestamps.
const MILLIS_CUTOFF: f64 = 1e12;

/// Raw value pushed by the remote flag store. Writers are inconsistent about
/// encoding, so consumers must parse defensively.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    Absent,
    Number(f64),
    Text(String),
}

impl FlagValue {
    /// Normalize to epoch milliseconds.
    ///
    /// Accepts both second- and millisecond-resolution encodings; values
    /// below 10^12 are seconds and are scaled up. Non-numeric values yield
    /// `None` rather than an error.
    pub fn as_epoch_millis(&self) -> Option<i64> {
        let raw = match self {
            FlagValue::Absent => return None,
            FlagValue::Number(n) => *n,
            FlagValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };

        if !raw.is_finite() || raw <= 0.0 {
            return None;
        }

        let millis = if raw < MILLIS_CUTOFF { raw * 1000.0 } else { raw };
        Some(millis as i64)
    }
}

/// Ownership token for a live flag subscription. Releasing (or dropping)
/// unsubscribes from the underlying store.
pub struct FlagSubscription {
    key: String,
    unsubscribe: Option<Box<dyn FnOnce() -> Result<(), anyhow::Error> + Send>>,
}

impl FlagSubscription {
    pub fn new(
        key: impl Into<String>,
        unsubscribe: impl FnOnce() -> Result<(), anyhow::Error> + Send + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Explicitly unsubscribe. Errors are returned so the caller can decide
    /// whether to log them; a dropped subscription logs instead.
    pub fn release(mut self) -> Result<(), SessionError> {
        match self.unsubscribe.take() {
            Some(unsubscribe) => unsubscribe().map_err(SessionError::ListenerTeardown),
            None => Ok(()),
        }
    }
}

impl Drop for FlagSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            if let Err(e) = unsubscribe() {
                tracing::warn!(key = %self.key, error = %e, "Flag unsubscribe failed on drop");
            }
        }
    }
}

/// Push-capable key-value store used to fan out "sign out everywhere"
/// signals. The store pushes the current value immediately on subscribe and
/// again on every write.
#[async_trait]
pub trait RemoteFlagStore: Send + Sync {
    async fn subscribe(
        &self,
        key: &str,
        tx: mpsc::UnboundedSender<FlagValue>,
    ) -> Result<FlagSubscription, SessionError>;
}

type SubscriberMap = DashMap<String, Vec<(u64, mpsc::UnboundedSender<FlagValue>)>>;

/// In-memory flag store for tests. Mirrors the real store's behavior of
/// replaying the current value to a fresh subscriber.
#[derive(Default)]
pub struct InMemoryFlagStore {
    subscribers: Arc<SubscriberMap>,
    values: DashMap<String, FlagValue>,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
    fail_unsubscribe: Arc<AtomicBool>,
}

impl InMemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value and push it to every live subscriber of the key.
    pub fn push(&self, key: &str, value: FlagValue) {
        self.values.insert(key.to_string(), value.clone());
        if let Some(mut entry) = self.subscribers.get_mut(key) {
            entry.retain(|(_, tx)| tx.send(value.clone()).is_ok());
        }
    }

    /// Number of live subscriptions across all keys.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Make unsubscribes fail until toggled off, to exercise teardown
    /// swallowing.
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteFlagStore for InMemoryFlagStore {
    async fn subscribe(
        &self,
        key: &str,
        tx: mpsc::UnboundedSender<FlagValue>,
    ) -> Result<FlagSubscription, SessionError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Replay current value first, like the real store's initial push.
        let current = self
            .values
            .get(key)
            .map(|v| v.clone())
            .unwrap_or(FlagValue::Absent);
        let _ = tx.send(current);

        self.subscribers
            .entry(key.to_string())
            .or_default()
            .push((id, tx));
        self.active.fetch_add(1, Ordering::SeqCst);

        let subscribers = Arc::clone(&self.subscribers);
        let active = Arc::clone(&self.active);
        let fail = Arc::clone(&self.fail_unsubscribe);
        let owned_key = key.to_string();

        Ok(FlagSubscription::new(key, move || {
            if let Some(mut entry) = subscribers.get_mut(&owned_key) {
                entry.retain(|(sub_id, _)| *sub_id != id);
            }
            active.fetch_sub(1, Ordering::SeqCst);
            if fail.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("simulated unsubscribe failure"));
            }
            Ok(())
        }))
    }
}
