//! Notifications list, read receipts and the unread badge.
//!
//! DESIGN
//! ======
//! The badge polls the server's unread counter (`/notificationBell/`)
//! rather than downloading the whole list. It refreshes on its own interval and immediately whenever
//! anything emits [`Topic::Notifications`] (a read receipt, a friend request
//! answered elsewhere in the app).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::bus::{EventBus, Subscription, Topic};
use crate::net::api::ApiClient;
use crate::net::types::ApiResult;
use crate::poll::{self, Feed, FeedSlot, PollHandle};

#[cfg(test)]
#[path = "notifications_test.rs"]
mod notifications_test;

pub const NOTIFICATIONS_ENDPOINT: &str = "/notifications/";
pub const NOTIFICATION_BELL_ENDPOINT: &str = "/notificationBell/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Absent from older list responses.
    #[serde(default)]
    pub id: Option<i64>,
    pub message: String,
    pub created_at: String,
    #[serde(default)]
    pub is_read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct BellResponse {
    quantity: usize,
}

#[must_use]
pub fn mark_read_endpoint(id: i64) -> String {
    format!("{NOTIFICATIONS_ENDPOINT}{id}/")
}

/// Newest-first list for the current user.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn fetch_notifications(api: &ApiClient) -> ApiResult<Vec<Notification>> {
    api.get(NOTIFICATIONS_ENDPOINT).await
}

#[must_use]
pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.is_read).count()
}

/// Unread count as reported by the server.
///
/// # Errors
///
/// See [`ApiClient::request`].
pub async fn fetch_unread_count(api: &ApiClient) -> ApiResult<usize> {
    let bell: BellResponse = api.get(NOTIFICATION_BELL_ENDPOINT).await?;
    Ok(bell.quantity)
}

/// Mark one notification read and tell every badge to refresh.
///
/// # Errors
///
/// See [`ApiClient::request`]. Nothing is emitted on failure.
pub async fn mark_read(api: &ApiClient, bus: &EventBus, id: i64) -> ApiResult<()> {
    api.post::<Value>(&mark_read_endpoint(id), None).await?;
    let woken = bus.emit(Topic::Notifications);
    tracing::debug!(id, woken, "notification marked read");
    Ok(())
}

// =============================================================================
// UNREAD BADGE
// =============================================================================

/// Live unread-notification count. Dropping it stops the poller.
pub struct UnreadBadge {
    slot: FeedSlot<usize>,
    _refresh: Subscription,
    poller: PollHandle,
}

impl UnreadBadge {
    /// Start polling every `interval` and on every [`Topic::Notifications`].
    #[must_use]
    pub fn mount(api: ApiClient, bus: &EventBus, interval: Duration) -> Self {
        let slot = FeedSlot::new();
        let poller = poll::spawn("unread_badge", interval, slot.clone(), move || {
            let api = api.clone();
            async move { fetch_unread_count(&api).await }
        });
        let kicker = poller.kicker();
        let refresh = bus.subscribe(Topic::Notifications, move || kicker.kick());
        Self { slot, _refresh: refresh, poller }
    }

    /// Latest count; `None` until the first fetch lands.
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        self.slot.get()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Feed<usize>> {
        self.slot.watch()
    }

    pub fn refresh(&self) {
        self.poller.kick();
    }

    pub fn unmount(self) {
        drop(self);
    }
}
