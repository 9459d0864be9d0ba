//! REST client with transparent credential refresh.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every component that talks to the API goes through [`ApiClient::request`].
//! Credentials are cookies managed by the server; when one expires the server
//! answers 401 and this module performs exactly one refresh followed by at
//! most one replay of the original call.
//!
//! ERROR HANDLING
//! ==============
//! Network failures and rejections come back as [`ApiError`] values. A failed
//! refresh is terminal for the session: it is reported as
//! [`ApiError::RefreshFailed`] and announced on the bus as
//! [`Topic::SessionExpired`]. Nothing is retried beyond that, so a dead
//! refresh token cannot cause a refresh loop.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::types::{ApiError, ApiResult, GENERIC_FAILURE_MESSAGE, Method, NETWORK_FAILURE_MESSAGE, server_message};
use crate::bus::{EventBus, Topic};

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

pub const REFRESH_ENDPOINT: &str = "/token/refresh/";
pub const AUTHENTICATED_ENDPOINT: &str = "/authenticated/";
pub const LOGIN_ENDPOINT: &str = "/login/";
pub const LOGOUT_ENDPOINT: &str = "/logout/";

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    bus: Option<EventBus>,
}

impl ApiClient {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport, bus: None }
    }

    /// Announce refresh failures on `bus` as [`Topic::SessionExpired`].
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Issue `method endpoint [body]` and decode the JSON response into `T`.
    ///
    /// On 401 the refresh endpoint is called once; if it succeeds the
    /// original request is replayed once and its outcome returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when no response arrives,
    /// [`ApiError::RefreshFailed`] when an expired credential cannot be
    /// renewed, [`ApiError::Rejected`] for non-2xx statuses and
    /// [`ApiError::Decode`] when a body does not (de)serialize.
    pub async fn request<T>(&self, endpoint: &str, method: Method, body: Option<&Value>) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!("api_request", %request_id, %method, endpoint);
        async move {
            let body = body
                .map(serde_json::to_vec)
                .transpose()
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            let request = HttpRequest { method, path: endpoint.to_owned(), body };

            let mut response = self.send(request.clone()).await?;
            if response.is_unauthorized() {
                tracing::debug!("credential rejected, refreshing");
                if !self.refresh().await {
                    tracing::warn!(endpoint, "credential refresh failed");
                    if let Some(bus) = &self.bus {
                        bus.emit(Topic::SessionExpired);
                    }
                    return Err(ApiError::RefreshFailed);
                }
                response = self.send(request).await?;
            }
            tracing::debug!(status = response.status, "api response");
            decode_response(response)
        }
        .instrument(span)
        .await
    }

    /// `GET endpoint`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(endpoint, Method::Get, None).await
    }

    /// `POST endpoint [body]`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post<T: DeserializeOwned>(&self, endpoint: &str, body: Option<&Value>) -> ApiResult<T> {
        self.request(endpoint, Method::Post, body).await
    }

    /// `DELETE endpoint`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        self.request(endpoint, Method::Delete, None).await
    }

    /// Ask the server to re-issue credentials. Returns `true` on a 2xx.
    pub async fn refresh(&self) -> bool {
        let request = HttpRequest { method: Method::Post, path: REFRESH_ENDPOINT.to_owned(), body: None };
        match self.transport.send(request).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "credential refresh request failed");
                false
            }
        }
    }

    async fn send(&self, request: HttpRequest) -> ApiResult<HttpResponse> {
        self.transport.send(request).await.map_err(|e| {
            let text = if e.0.trim().is_empty() { NETWORK_FAILURE_MESSAGE.to_owned() } else { e.0 };
            tracing::debug!(error = %text, "network failure");
            ApiError::Network(text)
        })
    }
}

/// Turn a raw response into the caller's value or a rejection.
pub(crate) fn decode_response<T: DeserializeOwned>(response: HttpResponse) -> ApiResult<T> {
    if !response.is_success() {
        let message = server_message(&response.body).unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_owned());
        return Err(ApiError::Rejected { status: response.status, message });
    }
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) { b"null" } else { &response.body };
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}
