mod common;

use common::Harness;
use session_sync::models::SessionState;
use session_sync::services::broadcast::{FALLBACK_CHANNEL, LOGOUT_SIGNAL};
use session_sync::services::BroadcastTransport;
use std::sync::Arc;

const NAMED_CHANNEL: &str = "firebase-logout-css3d";

#[tokio::test]
async fn sign_out_in_one_tab_reaches_the_other() {
    let transport = Arc::new(session_sync::services::InProcessBroadcast::new());
    let tab_a = Harness::spawn_with(transport.clone());
    let tab_b = Harness::spawn_with(transport);

    tab_a.authenticate("u1", "tok-a").await;
    tab_b.authenticate("u1", "tok-b").await;

    tab_a.manager.sign_out().await.unwrap();

    tab_b.wait_for(|s| *s == SessionState::SignedOut).await;
    assert_eq!(tab_b.provider.local_sign_out_count(), 1);
    // Local-only teardown in the receiving tab; no backend traffic.
    assert!(tab_b.backend.calls().is_empty());
}

#[tokio::test]
async fn named_channel_signal_is_trusted() {
    let h = Harness::spawn();
    h.authenticate("u1", "tok-1").await;

    h.transport.publish(NAMED_CHANNEL, LOGOUT_SIGNAL);

    h.wait_for(|s| *s == SessionState::SignedOut).await;
    assert_eq!(h.provider.local_sign_out_count(), 1);
}

#[tokio::test]
async fn fallback_message_is_ignored_while_session_is_valid() {
    let h = Harness::spawn();
    h.authenticate("u1", "tok-1").await;
    let refreshes_before = h.provider.refresh_call_count();

    h.transport
        .publish(FALLBACK_CHANNEL, r#"{"type":"LOGOUT_FIREBASE"}"#);
    h.settle().await;

    // Advisory only: the manager re-validated and kept the session.
    assert!(h.manager.current_state().is_authenticated());
    assert_eq!(h.provider.refresh_call_count(), refreshes_before + 1);
    assert_eq!(h.provider.local_sign_out_count(), 0);
}

#[tokio::test]
async fn fallback_message_is_honored_when_session_is_gone() {
    let h = Harness::spawn();
    h.authenticate("u1", "tok-1").await;
    h.provider.set_revoked(true);

    h.transport
        .publish(FALLBACK_CHANNEL, r#"{"type":"LOGOUT_FIREBASE"}"#);

    h.wait_for(|s| *s == SessionState::SignedOut).await;
    assert_eq!(h.provider.local_sign_out_count(), 1);
}

#[tokio::test]
async fn unrelated_fallback_messages_are_ignored() {
    let h = Harness::spawn();
    h.authenticate("u1", "tok-1").await;

    h.transport.publish(FALLBACK_CHANNEL, "not json");
    h.transport
        .publish(FALLBACK_CHANNEL, r#"{"type":"SOMETHING_ELSE"}"#);
    h.settle().await;

    assert!(h.manager.current_state().is_authenticated());
    assert_eq!(h.provider.local_sign_out_count(), 0);
}
