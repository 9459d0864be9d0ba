//! Session lifecycle: startup probe, login, logout and forced expiry.
//!
//! ARCHITECTURE
//! ============
//! `SessionManager` is the single writer of [`AuthState`]. State is published
//! through a `watch` channel so gates and widgets can await transitions
//! instead of polling.
//!
//! Every operation takes a fresh epoch when it starts and only writes its
//! outcome if no later operation has started meanwhile. Racing operations
//! therefore resolve to the one issued last: `login` immediately followed by
//! `logout` always ends logged out, whatever order the responses arrive in.
//!
//! Forced expiry (a failed credential refresh anywhere in the process) comes
//! in over the bus and is applied unconditionally.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::watch;

use super::auth::{AuthState, AuthStatus};
use crate::bus::{EventBus, Subscription, Topic};
use crate::net::api::{ApiClient, AUTHENTICATED_ENDPOINT, LOGIN_ENDPOINT, LOGOUT_ENDPOINT};
use crate::net::types::{AccountId, ApiError, AuthenticatedResponse};

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("account ID is required")]
    MissingIdentity,
    #[error("{0}")]
    Rejected(#[from] ApiError),
}

pub struct SessionManager {
    api: ApiClient,
    state: Arc<watch::Sender<AuthState>>,
    _expiry: Subscription,
}

impl SessionManager {
    /// Create a manager in the `Unknown` state, listening for
    /// [`Topic::SessionExpired`] on `bus`.
    #[must_use]
    pub fn new(api: ApiClient, bus: &EventBus) -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        let state = Arc::new(tx);
        let on_expiry = Arc::clone(&state);
        let expiry = bus.subscribe(Topic::SessionExpired, move || expire_state(&on_expiry));
        Self { api, state, _expiry: expiry }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Resolve once the status has left `Unknown`.
    pub async fn wait_until_known(&self) -> AuthState {
        let mut rx = self.watch();
        match rx.wait_for(|s| s.status().is_known()).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Startup sequence: silent refresh, then one authoritative probe.
    ///
    /// The probe runs whether or not the refresh succeeded, so there is a
    /// single path deciding the initial state.
    pub async fn bootstrap(&self) {
        self.state.send_modify(AuthState::enter);
        let refreshed = self.api.refresh().await;
        tracing::debug!(refreshed, "startup refresh settled");
        let mut epoch = 0;
        self.state.send_modify(|s| epoch = s.hand_off());
        self.probe(epoch).await;
    }

    /// Ask the server whether the ambient credential is still good.
    pub async fn check_authentication(&self) {
        let epoch = self.begin();
        self.probe(epoch).await;
    }

    async fn probe(&self, epoch: u64) {
        let outcome = match self.api.post::<AuthenticatedResponse>(AUTHENTICATED_ENDPOINT, None).await {
            Ok(resp) => resp.identity().map_or(AuthStatus::Unauthenticated, AuthStatus::Authenticated),
            Err(e) => {
                tracing::debug!(error = %e, "authentication probe failed");
                AuthStatus::Unauthenticated
            }
        };
        self.settle(epoch, outcome, "check");
    }

    /// Log in with an account ID and password.
    ///
    /// On success the identity is recorded directly from the arguments; the
    /// server is not re-probed.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::MissingIdentity`] for a blank account ID (no
    /// request is sent) and [`LoginError::Rejected`] with the server's
    /// failure otherwise. Either way the session ends `Unauthenticated`.
    pub async fn login(&self, account_id: &str, password: &str) -> Result<(), LoginError> {
        let epoch = self.begin();
        let Some(identity) = AccountId::new(account_id) else {
            self.settle(epoch, AuthStatus::Unauthenticated, "login");
            return Err(LoginError::MissingIdentity);
        };

        let body = json!({ "accountID": identity.as_str(), "password": password });
        match self.api.post::<Value>(LOGIN_ENDPOINT, Some(&body)).await {
            Ok(_) => {
                self.settle(epoch, AuthStatus::Authenticated(identity), "login");
                Ok(())
            }
            Err(e) => {
                self.settle(epoch, AuthStatus::Unauthenticated, "login");
                Err(LoginError::Rejected(e))
            }
        }
    }

    /// Log out. Server errors are logged, never surfaced.
    pub async fn logout(&self) {
        let epoch = self.begin();
        if let Err(e) = self.api.post::<Value>(LOGOUT_ENDPOINT, None).await {
            tracing::warn!(error = %e, "logout request failed");
        }
        self.settle(epoch, AuthStatus::Unauthenticated, "logout");
    }

    /// Drop to `Unauthenticated` immediately.
    pub fn expire(&self) {
        expire_state(&self.state);
    }

    fn begin(&self) -> u64 {
        let mut epoch = 0;
        self.state.send_modify(|s| epoch = s.begin());
        epoch
    }

    fn settle(&self, epoch: u64, outcome: AuthStatus, op: &'static str) {
        let summary = status_label(&outcome);
        let mut applied = false;
        self.state.send_modify(|s| applied = s.finish(epoch, outcome));
        if applied {
            tracing::info!(op, status = summary, "session updated");
        } else {
            tracing::debug!(op, epoch, "discarding superseded session result");
        }
    }
}

fn expire_state(state: &watch::Sender<AuthState>) {
    state.send_modify(|s| s.force(AuthStatus::Unauthenticated));
    tracing::info!("session expired");
}

fn status_label(status: &AuthStatus) -> &'static str {
    match status {
        AuthStatus::Unknown => "unknown",
        AuthStatus::Authenticated(_) => "authenticated",
        AuthStatus::Unauthenticated => "unauthenticated",
    }
}
