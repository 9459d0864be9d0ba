//! Auth-session state for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Read by route gates and identity-aware widgets; written only by
//! [`SessionManager`](super::session::SessionManager).
//!
//! The identity lives inside [`AuthStatus::Authenticated`], so an identity
//! without authentication (or the reverse) cannot be represented.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use crate::net::types::AccountId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthStatus {
    /// Startup: nobody has asked the server yet.
    #[default]
    Unknown,
    Authenticated(AccountId),
    Unauthenticated,
}

impl AuthStatus {
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Snapshot of the session published to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    status: AuthStatus,
    in_flight: u32,
    epoch: u64,
}

impl AuthState {
    #[must_use]
    pub fn status(&self) -> &AuthStatus {
        &self.status
    }

    #[must_use]
    pub fn account_id(&self) -> Option<&AccountId> {
        match &self.status {
            AuthStatus::Authenticated(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.account_id().is_some()
    }

    /// True while any session operation is awaiting the server.
    #[must_use]
    pub fn is_checking(&self) -> bool {
        self.in_flight > 0
    }

    /// Known to be logged out; guarded views should send the user to the entry route.
    #[must_use]
    pub fn should_redirect_unauth(&self) -> bool {
        matches!(self.status, AuthStatus::Unauthenticated)
    }

    /// Mark work in flight without competing for the status.
    pub(crate) fn enter(&mut self) {
        self.in_flight += 1;
    }

    pub(crate) fn leave(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Start an operation. The returned epoch supersedes every earlier one.
    pub(crate) fn begin(&mut self) -> u64 {
        self.enter();
        self.epoch += 1;
        self.epoch
    }

    /// Turn work marked with [`enter`](Self::enter) into a new operation
    /// without the in-flight count touching zero in between.
    pub(crate) fn hand_off(&mut self) -> u64 {
        let epoch = self.begin();
        self.leave();
        epoch
    }

    /// Finish the operation started at `epoch`.
    ///
    /// `outcome` is applied only when no later operation has begun. Returns
    /// whether the status was written.
    pub(crate) fn finish(&mut self, epoch: u64, outcome: AuthStatus) -> bool {
        self.leave();
        if epoch != self.epoch {
            return false;
        }
        self.status = outcome;
        true
    }

    /// Overwrite the status regardless of in-flight operations.
    pub(crate) fn force(&mut self, status: AuthStatus) {
        self.status = status;
    }
}
