use crate::services::manager::SessionEvent;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Literal payload published on the named channel.
pub const LOGOUT_SIGNAL: &str = "LOGOUT";

/// Untargeted fallback channel for contexts without the named primitive.
pub const FALLBACK_CHANNEL: &str = "window-message";

/// `type` discriminant of the fallback payload.
pub const FALLBACK_LOGOUT_TYPE: &str = "LOGOUT_FIREBASE";

const CHANNEL_CAPACITY: usize = 16;

/// Typed payload carried on the fallback channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackMessage {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Same-origin publish/subscribe transport. Stands in for the browser's
/// named broadcast channel plus untargeted message posting.
pub trait BroadcastTransport: Send + Sync {
    fn publish(&self, channel: &str, payload: &str);
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String>;
}

/// In-process transport backed by per-channel `tokio::sync::broadcast`.
#[derive(Default)]
pub struct InProcessBroadcast {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl InProcessBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl BroadcastTransport for InProcessBroadcast {
    fn publish(&self, channel: &str, payload: &str) {
        // No receivers is fine; delivery is best-effort by design.
        let _ = self.sender(channel).send(payload.to_string());
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.sender(channel).subscribe()
    }
}

/// Propagates a logout signal to other same-origin contexts without a
/// server round trip. A latency optimization layered on top of the
/// authoritative remote logout listener, not a substitute for it.
#[derive(Clone)]
pub struct CrossTabBridge {
    transport: Arc<dyn BroadcastTransport>,
    channel: String,
}

impl CrossTabBridge {
    pub fn new(transport: Arc<dyn BroadcastTransport>, channel: impl Into<String>) -> Self {
        Self {
            transport,
            channel: channel.into(),
        }
    }

    /// Publish the logout signal on the named channel and, best-effort, the
    /// untargeted fallback. No acknowledgement or delivery guarantee.
    pub fn broadcast_logout(&self) {
        self.transport.publish(&self.channel, LOGOUT_SIGNAL);

        match serde_json::to_string(&FallbackMessage {
            kind: FALLBACK_LOGOUT_TYPE.to_string(),
        }) {
            Ok(payload) => self.transport.publish(FALLBACK_CHANNEL, &payload),
            Err(e) => tracing::warn!(error = %e, "Failed to encode fallback logout message"),
        }

        tracing::debug!(channel = %self.channel, "Cross-tab logout broadcast");
    }

    /// Subscribe to both channels and forward logout signals as session
    /// events. Fallback messages have no origin guarantee, so they are
    /// flagged untrusted and the receiver must re-validate before acting.
    pub fn listen(&self, events_tx: mpsc::UnboundedSender<SessionEvent>) -> BridgeSubscription {
        let named_rx = self.transport.subscribe(&self.channel);
        let fallback_rx = self.transport.subscribe(FALLBACK_CHANNEL);

        let named_tx = events_tx.clone();
        let named = tokio::spawn(forward(named_rx, move |payload| {
            if payload == LOGOUT_SIGNAL {
                let _ = named_tx.send(SessionEvent::CrossTabLogout { trusted: true });
            }
        }));

        let fallback = tokio::spawn(forward(fallback_rx, move |payload| {
            let Ok(message) = serde_json::from_str::<FallbackMessage>(&payload) else {
                return;
            };
            if message.kind == FALLBACK_LOGOUT_TYPE {
                let _ = events_tx.send(SessionEvent::CrossTabLogout { trusted: false });
            }
        }));

        BridgeSubscription {
            tasks: vec![named, fallback],
        }
    }
}

async fn forward(mut rx: broadcast::Receiver<String>, mut handle: impl FnMut(String)) {
    loop {
        match rx.recv().await {
            Ok(payload) => handle(payload),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Cross-tab receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Ownership token for a live bridge subscription; releasing (or dropping)
/// stops both forwarding tasks. Idempotent.
pub struct BridgeSubscription {
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeSubscription {
    pub fn release(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for BridgeSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
