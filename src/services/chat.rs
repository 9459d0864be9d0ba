//! Event live chat: message feed, posting and moderation.
//!
//! DESIGN
//! ======
//! There is no push channel; the open chat view is a [`ChatFeed`] polling the
//! message list. Posting a message kicks the feed so the sender sees it
//! without waiting a full interval.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::watch;

use super::segment;
use crate::net::api::ApiClient;
use crate::net::types::ApiResult;
use crate::poll::{self, Feed, FeedSlot, PollHandle};

#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub text: String,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    /// The current user wrote this message.
    #[serde(default)]
    pub is_owner: bool,
}

#[must_use]
pub fn messages_endpoint(event_id: &str) -> String {
    format!("/{}/liveChat/", segment(event_id))
}

/// # Errors
///
/// See [`ApiClient::request`].
pub async fn fetch_messages(api: &ApiClient, event_id: &str) -> ApiResult<Vec<ChatMessage>> {
    api.get(&messages_endpoint(event_id)).await
}

/// Post `text` to the event chat. Blank text is not sent.
///
/// Returns whether a message was sent.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn send_message(api: &ApiClient, event_id: &str, text: &str) -> ApiResult<bool> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }
    let endpoint = format!("/{}/liveChat/talk/", segment(event_id));
    api.post::<Value>(&endpoint, Some(&json!({ "message": text }))).await?;
    Ok(true)
}

/// Whether the organisers have closed the chat.
///
/// The server answers `{"success": bool}`, `true` once the final message
/// is posted; a bare boolean is also accepted. Anything else reads as still
/// open.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn has_chat_ended(api: &ApiClient, event_id: &str) -> ApiResult<bool> {
    let body: Value = api.get(&format!("/{}/hasChatEnded/", segment(event_id))).await?;
    Ok(match body {
        Value::Bool(ended) => ended,
        other => other.get("success").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Close the chat with the organisers' final message.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn end_chat(api: &ApiClient, society: &str, event_id: &str) -> ApiResult<()> {
    let endpoint = format!("/Societies/{}/Events/{}/liveChat/sendFinalMessage/", segment(society), segment(event_id));
    api.post::<Value>(&endpoint, None).await?;
    tracing::info!(society, event_id, "chat ended");
    Ok(())
}

/// # Errors
///
/// See [`ApiClient::request`].
pub async fn delete_message(api: &ApiClient, society: &str, event_id: &str, message_id: i64) -> ApiResult<()> {
    let endpoint = format!("/{}/{}/liveChat/{message_id}/delete/", segment(society), segment(event_id));
    api.delete::<Value>(&endpoint).await?;
    Ok(())
}

// =============================================================================
// FEED
// =============================================================================

/// Polled message list of one event chat. Dropping it stops the poller.
pub struct ChatFeed {
    api: ApiClient,
    event_id: String,
    slot: FeedSlot<Vec<ChatMessage>>,
    poller: PollHandle,
}

impl ChatFeed {
    #[must_use]
    pub fn mount(api: ApiClient, event_id: &str, interval: Duration) -> Self {
        let slot = FeedSlot::new();
        let fetch_api = api.clone();
        let fetch_event = event_id.to_owned();
        let poller = poll::spawn("chat_feed", interval, slot.clone(), move || {
            let api = fetch_api.clone();
            let event_id = fetch_event.clone();
            async move { fetch_messages(&api, &event_id).await }
        });
        Self { api, event_id: event_id.to_owned(), slot, poller }
    }

    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Latest message list; `None` until the first fetch lands.
    #[must_use]
    pub fn messages(&self) -> Option<Vec<ChatMessage>> {
        self.slot.get()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Feed<Vec<ChatMessage>>> {
        self.slot.watch()
    }

    /// Send `text` and refresh the feed if anything was sent.
    ///
    /// # Errors
    ///
    /// See [`send_message`].
    pub async fn send(&self, text: &str) -> ApiResult<bool> {
        let sent = send_message(&self.api, &self.event_id, text).await?;
        if sent {
            self.poller.kick();
        }
        Ok(sent)
    }

    pub fn unmount(self) {
        drop(self);
    }
}
