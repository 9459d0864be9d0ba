//! Composition root: one transport, one bus, one session per process.
//!
//! ARCHITECTURE
//! ============
//! [`Hub`] owns the shared [`EventBus`] and hands clones of the
//! [`ApiClient`] and the session to everything it builds. Nothing in the
//! crate reaches for a global; a second `Hub` is a fully independent client
//! (separate cookie jar, separate session).

use std::sync::Arc;

use crate::bus::EventBus;
use crate::config::ClientConfig;
use crate::gate::{AuthGate, CapabilityKind};
use crate::net::api::ApiClient;
use crate::net::transport::{HttpTransport, ReqwestTransport, TransportError};
use crate::services::chat::ChatFeed;
use crate::services::notifications::UnreadBadge;
use crate::services::permissions;
use crate::state::session::SessionManager;

#[cfg(test)]
#[path = "app_test.rs"]
mod app_test;

pub struct Hub {
    config: ClientConfig,
    bus: EventBus,
    api: ApiClient,
    session: Arc<SessionManager>,
}

impl Hub {
    /// Build a client talking to `config.api_base_url` over reqwest.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&config.api_base_url, config.timeouts)?;
        tracing::debug!(base_url = transport.base_url(), "api transport ready");
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a client over any transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let bus = EventBus::new();
        let api = ApiClient::new(transport).with_bus(bus.clone());
        let session = Arc::new(SessionManager::new(api.clone(), &bus));
        Self { config, bus, api, session }
    }

    /// Run the startup session sequence. Call once before mounting gates.
    pub async fn startup(&self) {
        self.session.bootstrap().await;
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    #[must_use]
    pub fn plain_gate(&self) -> AuthGate {
        AuthGate::plain(Arc::clone(&self.session))
    }

    #[must_use]
    pub fn scoped_gate(&self, kind: CapabilityKind) -> AuthGate {
        let capability = permissions::capability(kind, self.api.clone());
        AuthGate::scoped(Arc::clone(&self.session), capability, self.config.probe_timeout)
    }

    /// Mount the unread-notification badge at the configured interval.
    #[must_use]
    pub fn unread_badge(&self) -> UnreadBadge {
        UnreadBadge::mount(self.api.clone(), &self.bus, self.config.poll.badge)
    }

    /// Mount the chat feed for `event_id` at the configured interval.
    #[must_use]
    pub fn chat_feed(&self, event_id: &str) -> ChatFeed {
        ChatFeed::mount(self.api.clone(), event_id, self.config.poll.chat)
    }
}
