//! Typed wrappers over the REST endpoints the live views use.
//!
//! Each service is a set of free functions taking the shared
//! [`ApiClient`](crate::net::api::ApiClient); mutations that make another
//! widget's data stale emit on the [`EventBus`](crate::bus::EventBus) after
//! their own request succeeds. The two polled widgets (unread badge and chat
//! feed) live next to the endpoints they poll.

use std::borrow::Cow;

pub mod chat;
pub mod friends;
pub mod notifications;
pub mod permissions;
pub mod profile;

/// Percent-encode a caller-supplied value for use as one path segment.
pub(crate) fn segment(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw.trim())
}
