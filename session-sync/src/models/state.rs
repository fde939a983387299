use super::Identity;

/// Current session state. Single writer: the session manager actor.
///
/// `Transitioning` covers a sign-in or sign-out in flight; it is terminal
/// only at process shutdown. At most one `Authenticated` value is live at a
/// time and transitions never interleave.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    SignedOut,
    Transitioning,
    Authenticated(Identity),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    /// Projection to `Identity | None` for callers that only care about who
    /// is signed in.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn identity_projection() {
        assert!(SessionState::SignedOut.identity().is_none());
        assert!(SessionState::Transitioning.identity().is_none());

        let identity = Identity::new("u1", "tok", Utc::now());
        let state = SessionState::Authenticated(identity.clone());
        assert_eq!(state.identity(), Some(&identity));
        assert!(state.is_authenticated());
    }
}
