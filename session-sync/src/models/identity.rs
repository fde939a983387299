use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only snapshot of the identity provider's signed-in user.
///
/// The bearer token is opaque; the provider owns its lifetime and rotates it
/// on refresh. Holders must not cache the token past the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub id_token: String,
    pub token_expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        id_token: impl Into<String>,
        token_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            id_token: id_token.into(),
            token_expires_at,
        }
    }
}
