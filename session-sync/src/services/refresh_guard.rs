use crate::models::Identity;
use crate::services::{IdentityProvider, SessionError};
use std::sync::Arc;

/// Wraps a raw provider identity and detects server-side revocation by
/// forcing a token refresh.
///
/// Runs once per raw provider auth event, not on a poll: the provider only
/// fires the event on its own state changes, so the guard's sole job is to
/// distinguish "still valid" from "revoked out from under us".
#[derive(Clone)]
pub struct TokenRefreshGuard {
    provider: Arc<dyn IdentityProvider>,
}

impl TokenRefreshGuard {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Force a refresh of the identity's bearer token.
    ///
    /// On [`SessionError::Revoked`] the caller must perform a full local
    /// sign-out and make no further backend calls with the stale token.
    pub async fn validate(&self, identity: &Identity) -> Result<Identity, SessionError> {
        match self.provider.force_refresh(identity).await {
            Ok(refreshed) => Ok(refreshed),
            Err(SessionError::Revoked) => {
                tracing::info!(user_id = %identity.user_id, "Session revoked server-side");
                Err(SessionError::Revoked)
            }
            Err(e) => {
                tracing::warn!(user_id = %identity.user_id, error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockIdentityProvider;
    use chrono::Utc;

    #[tokio::test]
    async fn valid_session_passes_through() {
        let provider = Arc::new(MockIdentityProvider::new());
        let guard = TokenRefreshGuard::new(provider.clone());

        let identity = Identity::new("u1", "tok", Utc::now());
        let refreshed = guard.validate(&identity).await.unwrap();
        assert_eq!(refreshed.user_id, "u1");
        assert_eq!(provider.refresh_call_count(), 1);
    }

    #[tokio::test]
    async fn revoked_session_is_reported() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.set_revoked(true);
        let guard = TokenRefreshGuard::new(provider);

        let identity = Identity::new("u1", "tok", Utc::now());
        let result = guard.validate(&identity).await;
        assert!(matches!(result, Err(SessionError::Revoked)));
    }
}
