use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Provider error: {0}")]
    Provider(anyhow::Error),

    #[error("Sign-in cancelled by user")]
    Cancelled,

    #[error("Session revoked server-side")]
    Revoked,

    #[error("Backend notify failed: {0}")]
    BackendNotify(anyhow::Error),

    #[error("Listener teardown failed: {0}")]
    ListenerTeardown(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::BackendNotify(anyhow::Error::new(err))
    }
}

impl SessionError {
    /// Whether this failure may be surfaced to the caller that initiated an
    /// interactive sign-in. Everything else is contained by the manager and
    /// resolved toward `SignedOut`.
    pub fn is_surfaceable(&self) -> bool {
        matches!(self, SessionError::Provider(_) | SessionError::Cancelled)
    }
}
