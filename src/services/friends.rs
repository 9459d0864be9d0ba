//! Friend lists and friend-request answers.
//!
//! Answering a request changes both the request lists and (server side) the
//! notification feed, so accept and decline emit [`Topic::FriendRequests`]
//! and [`Topic::Notifications`] once the server has confirmed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::{EventBus, Topic};
use crate::net::api::ApiClient;
use crate::net::types::{AccountId, ApiResult};

#[cfg(test)]
#[path = "friends_test.rs"]
mod friends_test;

pub const INCOMING_ENDPOINT: &str = "/friends/incoming/";
pub const OUTGOING_ENDPOINT: &str = "/friends/outgoing/";
pub const FRIENDS_ENDPOINT: &str = "/friends/list/";

/// A friend or the other side of a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl Friend {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAnswer {
    Accept,
    Decline,
}

impl RequestAnswer {
    fn verb(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
        }
    }
}

/// Requests other users sent to the current user.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn incoming(api: &ApiClient) -> ApiResult<Vec<Friend>> {
    api.get(INCOMING_ENDPOINT).await
}

/// Requests the current user sent and that are still pending.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn outgoing(api: &ApiClient) -> ApiResult<Vec<Friend>> {
    api.get(OUTGOING_ENDPOINT).await
}

/// # Errors
///
/// See [`ApiClient::request`].
pub async fn list(api: &ApiClient) -> ApiResult<Vec<Friend>> {
    api.get(FRIENDS_ENDPOINT).await
}

/// Accept or decline the request from `from`.
///
/// # Errors
///
/// See [`ApiClient::request`]. Nothing is emitted on failure.
pub async fn answer(api: &ApiClient, bus: &EventBus, from: &AccountId, answer: RequestAnswer) -> ApiResult<()> {
    let endpoint = format!("/friends/{}/{}/", answer.verb(), super::segment(from.as_str()));
    api.post::<Value>(&endpoint, None).await?;
    bus.emit(Topic::FriendRequests);
    bus.emit(Topic::Notifications);
    tracing::info!(%from, answer = answer.verb(), "friend request answered");
    Ok(())
}

/// # Errors
///
/// See [`ApiClient::request`].
pub async fn accept(api: &ApiClient, bus: &EventBus, from: &AccountId) -> ApiResult<()> {
    answer(api, bus, from, RequestAnswer::Accept).await
}

/// # Errors
///
/// See [`ApiClient::request`].
pub async fn decline(api: &ApiClient, bus: &EventBus, from: &AccountId) -> ApiResult<()> {
    answer(api, bus, from, RequestAnswer::Decline).await
}

/// Unfriend `friend`.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn remove(api: &ApiClient, friend: &AccountId) -> ApiResult<()> {
    let endpoint = format!("/friends/remove/{}/", super::segment(friend.as_str()));
    api.post::<Value>(&endpoint, None).await?;
    Ok(())
}
