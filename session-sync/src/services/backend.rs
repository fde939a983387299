use crate::services::SessionError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server that turns a bearer token into a session cookie and can force
/// remote sign-out by writing a logout flag.
///
/// All calls are advisory from the state machine's point of view: a failure
/// is logged by the caller and never blocks a local transition.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// `POST /api/users-signin` — establish the server session cookie.
    async fn notify_sign_in(&self, id_token: &str) -> Result<(), SessionError>;

    /// `POST /api/users-signout` — clear the server session cookie. Accepts
    /// no token as a cookie-clearing fallback.
    async fn notify_sign_out(&self, id_token: Option<&str>) -> Result<(), SessionError>;

    /// `POST /api/users-setLogoutFlag` — write a fresh logout flag for the
    /// acting user, signing out their other devices.
    async fn set_logout_flag(&self, id_token: &str) -> Result<(), SessionError>;
}

/// HTTPS client for the session backend. Cookies are stored and sent on
/// every request so the server session cookie round-trips.
#[derive(Clone)]
pub struct HttpSessionBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| SessionError::Internal(anyhow::Error::new(e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<(), SessionError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::BackendNotify(anyhow::anyhow!(
                "{} returned {}",
                path,
                status
            )));
        }

        tracing::debug!(path = %path, "Backend notified");
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn notify_sign_in(&self, id_token: &str) -> Result<(), SessionError> {
        self.post_json("/api/users-signin", json!({ "idToken": id_token }))
            .await
    }

    async fn notify_sign_out(&self, id_token: Option<&str>) -> Result<(), SessionError> {
        let body = match id_token {
            Some(token) => json!({ "idToken": token }),
            None => json!({}),
        };
        self.post_json("/api/users-signout", body).await
    }

    async fn set_logout_flag(&self, id_token: &str) -> Result<(), SessionError> {
        self.post_json("/api/users-setLogoutFlag", json!({ "idToken": id_token }))
            .await
    }
}

/// A call recorded by [`MockSessionBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    SignIn { id_token: String },
    SignOut { id_token: Option<String> },
    SetLogoutFlag { id_token: String },
}

/// Records calls and supports failure injection per endpoint.
#[derive(Default)]
pub struct MockSessionBackend {
    calls: Mutex<Vec<BackendCall>>,
    fail_sign_in: AtomicBool,
    fail_sign_out: AtomicBool,
    fail_set_flag: AtomicBool,
}

impl MockSessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    pub fn fail_sign_in(&self, fail: bool) {
        self.fail_sign_in.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set_flag(&self, fail: bool) {
        self.fail_set_flag.store(fail, Ordering::SeqCst);
    }

    fn simulated_network_error() -> SessionError {
        SessionError::BackendNotify(anyhow::anyhow!("simulated network error"))
    }
}

#[async_trait]
impl SessionBackend for MockSessionBackend {
    async fn notify_sign_in(&self, id_token: &str) -> Result<(), SessionError> {
        // Attempts are recorded even when the simulated network fails, so
        // tests can assert which calls were issued.
        lock(&self.calls).push(BackendCall::SignIn {
            id_token: id_token.to_string(),
        });
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(Self::simulated_network_error());
        }
        Ok(())
    }

    async fn notify_sign_out(&self, id_token: Option<&str>) -> Result<(), SessionError> {
        lock(&self.calls).push(BackendCall::SignOut {
            id_token: id_token.map(str::to_string),
        });
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(Self::simulated_network_error());
        }
        Ok(())
    }

    async fn set_logout_flag(&self, id_token: &str) -> Result<(), SessionError> {
        lock(&self.calls).push(BackendCall::SetLogoutFlag {
            id_token: id_token.to_string(),
        });
        if self.fail_set_flag.load(Ordering::SeqCst) {
            return Err(Self::simulated_network_error());
        }
        Ok(())
    }
}
