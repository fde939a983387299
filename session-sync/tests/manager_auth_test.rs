mod common;

use common::{identity, Harness};
use session_sync::models::SessionState;
use session_sync::services::{BackendCall, SessionError};

#[tokio::test]
async fn provider_identity_becomes_authenticated_and_arms_listener() {
    let h = Harness::spawn();
    let user_id = format!("user-{}", uuid::Uuid::new_v4());

    h.provider
        .emit_state_change(Some(identity(&user_id, "tok-1")));

    let state = h.wait_for(|s| s.is_authenticated()).await;
    assert_eq!(state.identity().unwrap().user_id, user_id);

    // Guard ran once against the raw event and the logout listener is live.
    assert_eq!(h.provider.refresh_call_count(), 1);
    assert_eq!(h.store.active_subscriptions(), 1);

    // No backend traffic for a provider-initiated auth event.
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn revoked_session_forces_local_sign_out() {
    let h = Harness::spawn();
    h.provider.set_revoked(true);

    h.provider.emit_state_change(Some(identity("u1", "stale")));
    h.settle().await;

    assert_eq!(h.manager.current_state(), SessionState::SignedOut);
    assert_eq!(h.provider.local_sign_out_count(), 1);
    assert_eq!(h.store.active_subscriptions(), 0);
    // No backend call is attempted with the stale token.
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn provider_sign_out_event_clears_state() {
    let h = Harness::spawn();
    h.authenticate("u1", "tok-1").await;
    assert_eq!(h.store.active_subscriptions(), 1);

    h.provider.emit_state_change(None);
    h.settle().await;

    assert_eq!(h.manager.current_state(), SessionState::SignedOut);
    assert_eq!(h.store.active_subscriptions(), 0);
}

#[tokio::test]
async fn interactive_sign_in_notifies_backend() {
    let h = Harness::spawn();
    h.provider.script_sign_in(Ok(identity("u1", "tok-1")));

    let signed_in = h.manager.sign_in_with_provider().await.unwrap();
    assert_eq!(signed_in.user_id, "u1");

    let state = h.wait_for(|s| s.is_authenticated()).await;
    assert_eq!(state.identity().unwrap().user_id, "u1");
    assert_eq!(
        h.backend.calls(),
        vec![BackendCall::SignIn {
            id_token: "tok-1".to_string()
        }]
    );

    // The provider's own auth event follows and arms the listener.
    h.settle().await;
    assert_eq!(h.store.active_subscriptions(), 1);
}

#[tokio::test]
async fn backend_notify_failure_does_not_block_sign_in() {
    let h = Harness::spawn();
    h.backend.fail_sign_in(true);
    h.provider.script_sign_in(Ok(identity("u1", "tok-1")));

    // Simulated network error on /api/users-signin: local state still wins.
    let signed_in = h.manager.sign_in_with_provider().await.unwrap();
    assert_eq!(signed_in.user_id, "u1");

    let state = h.wait_for(|s| s.is_authenticated()).await;
    assert!(state.is_authenticated());

    // The attempt was issued before it failed.
    assert_eq!(
        h.backend.calls(),
        vec![BackendCall::SignIn {
            id_token: "tok-1".to_string()
        }]
    );
}

#[tokio::test]
async fn cancelled_sign_in_surfaces_and_leaves_state_alone() {
    let h = Harness::spawn();
    h.provider.script_sign_in(Err(SessionError::Cancelled));

    let result = h.manager.sign_in_with_provider().await;
    assert!(matches!(result, Err(SessionError::Cancelled)));

    h.settle().await;
    assert_eq!(h.manager.current_state(), SessionState::SignedOut);
    assert!(h.backend.calls().is_empty());
}
