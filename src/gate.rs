//! Per-navigation authorization gates for protected views.
//!
//! SYSTEM CONTEXT
//! ==============
//! A view that needs a logged-in user (plain gate) or a specific capability
//! (scoped gate) is wrapped in an [`AuthGate`]. Each call to
//! [`AuthGate::navigate`] resolves the decision for that navigation: it
//! waits for the session to leave `Unknown`, redirects anonymous users to
//! the entry route, and for scoped gates issues exactly one capability probe.
//!
//! DESIGN
//! ======
//! Every navigation takes a new generation. A decision is published only if
//! its generation is still the newest, so a slow probe from a previous route
//! can never flip the view of the current one. Decisions are never cached
//! across navigations.
//!
//! A decision holds only for the session it was made under. The gate follows
//! the session and, when a known status changes (logout, forced expiry, a
//! different login), resolves the current route again under a new
//! generation: anonymous users are redirected, scoped gates probe again.
//!
//! ERROR HANDLING
//! ==============
//! Fail-closed. A probe that errors, times out or answers anything but a
//! literal `true` is a denial. Denial is a view state, not an error.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::net::types::{AccountId, ApiResult};
use crate::state::auth::{AuthState, AuthStatus};
use crate::state::session::SessionManager;

#[cfg(test)]
#[path = "gate_test.rs"]
mod gate_test;

/// Where anonymous users are sent.
pub const ENTRY_ROUTE: &str = "/";
pub const NO_PERMISSION_MESSAGE: &str = "You don't have permission to access this page.";
/// Route parameter naming the society a scoped capability applies to.
pub const SOCIETY_PARAM: &str = "society_name";

// =============================================================================
// CAPABILITIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Admin,
    SocietyAdmin,
    Member,
}

impl CapabilityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SocietyAdmin => "society_admin",
            Self::Member => "member",
        }
    }

    /// Whether the probe is keyed by a route resource.
    #[must_use]
    pub fn is_scoped(self) -> bool {
        !matches!(self, Self::Admin)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for CapabilityKind {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "admin" => Ok(Self::Admin),
            "society_admin" => Ok(Self::SocietyAdmin),
            "member" => Ok(Self::Member),
            _ => Err(UnknownCapability(s.to_owned())),
        }
    }
}

/// Parameters of the route being entered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(HashMap<String, String>);

impl RouteParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_owned(), value.to_owned());
        self
    }

    /// A non-blank parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    #[must_use]
    pub fn society(&self) -> Option<&str> {
        self.get(SOCIETY_PARAM)
    }
}

/// An asynchronous yes/no question about the current identity.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    fn kind(&self) -> CapabilityKind;

    /// Resolve the capability for `identity` on the route described by `params`.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the underlying probe; callers treat it
    /// as a denial.
    async fn resolve(&self, params: &RouteParams, identity: &AccountId) -> ApiResult<bool>;
}

// =============================================================================
// DECISIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pending,
    Granted,
    Denied,
}

impl Decision {
    #[must_use]
    pub fn view(self) -> GateView {
        match self {
            Self::Pending => GateView::Loading,
            Self::Granted => GateView::Render,
            Self::Denied => GateView::NoPermission,
        }
    }
}

/// What the guarded slot should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateView {
    #[default]
    Loading,
    Redirect(&'static str),
    Render,
    NoPermission,
}

/// Plain-gate view for a session snapshot.
#[must_use]
pub fn plain_view(state: &AuthState) -> GateView {
    match state.status() {
        AuthStatus::Unknown => GateView::Loading,
        AuthStatus::Unauthenticated => GateView::Redirect(ENTRY_ROUTE),
        AuthStatus::Authenticated(_) => GateView::Render,
    }
}

/// Published gate state: the view and the navigation it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateState {
    generation: u64,
    view: GateView,
}

impl GateState {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn view(&self) -> GateView {
        self.view
    }
}

// =============================================================================
// GATE
// =============================================================================

/// A gate over one guarded slot. Dropping it stops following the session.
pub struct AuthGate {
    inner: Arc<GateInner>,
    follower: JoinHandle<()>,
}

struct GateInner {
    session: Arc<SessionManager>,
    capability: Option<Arc<dyn Capability>>,
    probe_timeout: Duration,
    state: watch::Sender<GateState>,
    route: Mutex<Option<RouteParams>>,
}

impl AuthGate {
    /// Gate that only requires an authenticated session.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn plain(session: Arc<SessionManager>) -> Self {
        Self::build(session, None, Duration::ZERO)
    }

    /// Gate that additionally requires `capability`, probed with `probe_timeout`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn scoped(session: Arc<SessionManager>, capability: Arc<dyn Capability>, probe_timeout: Duration) -> Self {
        Self::build(session, Some(capability), probe_timeout)
    }

    fn build(session: Arc<SessionManager>, capability: Option<Arc<dyn Capability>>, probe_timeout: Duration) -> Self {
        let (state, _rx) = watch::channel(GateState::default());
        let session_rx = session.watch();
        let inner = Arc::new(GateInner { session, capability, probe_timeout, state, route: Mutex::new(None) });
        let follower = tokio::spawn(follow_session(Arc::clone(&inner), session_rx));
        Self { inner, follower }
    }

    #[must_use]
    pub fn capability(&self) -> Option<CapabilityKind> {
        self.inner.capability.as_ref().map(|c| c.kind())
    }

    #[must_use]
    pub fn view(&self) -> GateView {
        self.inner.state.borrow().view
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<GateState> {
        self.inner.state.subscribe()
    }

    /// Resolve the gate for a navigation to a route with `params`.
    ///
    /// Returns the published view, or `None` when a later navigation (or a
    /// session transition) superseded this one before it resolved.
    pub async fn navigate(&self, params: &RouteParams) -> Option<GateView> {
        *self.inner.route() = Some(params.clone());
        self.inner.resolve(params).await
    }
}

impl Drop for AuthGate {
    fn drop(&mut self) {
        self.follower.abort();
    }
}

impl GateInner {
    fn route(&self) -> MutexGuard<'_, Option<RouteParams>> {
        self.route.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn resolve(&self, params: &RouteParams) -> Option<GateView> {
        let generation = self.start();
        let session = self.session.wait_until_known().await;

        let view = match (session.status(), &self.capability) {
            (AuthStatus::Authenticated(identity), Some(capability)) => {
                self.probe(capability.as_ref(), params, identity).await.view()
            }
            _ => plain_view(&session),
        };
        self.publish(generation, view)
    }

    async fn probe(&self, capability: &dyn Capability, params: &RouteParams, identity: &AccountId) -> Decision {
        let kind = capability.kind();
        match tokio::time::timeout(self.probe_timeout, capability.resolve(params, identity)).await {
            Ok(Ok(true)) => Decision::Granted,
            Ok(Ok(false)) => Decision::Denied,
            Ok(Err(e)) => {
                tracing::warn!(%kind, error = %e, "capability probe failed");
                Decision::Denied
            }
            Err(_) => {
                tracing::warn!(%kind, timeout = ?self.probe_timeout, "capability probe timed out");
                Decision::Denied
            }
        }
    }

    fn start(&self) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.generation += 1;
            s.view = GateView::Loading;
            generation = s.generation;
        });
        generation
    }

    fn publish(&self, generation: u64, view: GateView) -> Option<GateView> {
        let applied = self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            s.view = view;
            true
        });
        if applied {
            tracing::debug!(generation, ?view, "gate resolved");
            Some(view)
        } else {
            tracing::debug!(generation, ?view, "discarding stale gate decision");
            None
        }
    }
}

/// Re-resolve the current route whenever a known session status changes
/// (logout, forced expiry, a different login).
///
/// The first transition out of `Unknown` is left to the pending
/// [`AuthGate::navigate`], which already waits for it.
async fn follow_session(inner: Arc<GateInner>, mut session: watch::Receiver<AuthState>) {
    let mut last = session.borrow_and_update().status().clone();
    while session.changed().await.is_ok() {
        let status = session.borrow_and_update().status().clone();
        if status == last {
            continue;
        }
        let was_known = last.is_known();
        last = status;
        if !was_known {
            continue;
        }
        let route = inner.route().clone();
        if let Some(params) = route {
            tracing::debug!(status = ?last, "session changed under gate; resolving again");
            inner.resolve(&params).await;
        }
    }
}
