//! Wire and result types shared by the transport, session and services.
//!
//! ERROR HANDLING
//! ==============
//! `ApiResult<T>` is the value every REST call resolves to. Ordinary failures
//! (network, rejection, expired credentials) are data, never panics, so
//! callers branch on `Err` instead of unwinding through UI code.

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed";
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong!";
pub const NETWORK_FAILURE_MESSAGE: &str = "Network error!";

// =============================================================================
// METHOD
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// Failure half of [`ApiResult`]. `Display` yields the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Connection, DNS or timeout failure. Never retried.
    #[error("{0}")]
    Network(String),

    /// The credential refresh after a 401 failed; the session is over.
    #[error("Authentication failed")]
    RefreshFailed,

    /// Non-2xx response carrying the server's message or a generic fallback.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The request or response body did not (de)serialize.
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status for server rejections.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, Self::RefreshFailed)
    }
}

/// Outcome of a REST call: `Ok` is `{failed: false, value}`, `Err` is
/// `{failed: true, message}`.
pub type ApiResult<T> = Result<T, ApiError>;

/// Pull a human-readable message out of an error body.
///
/// The API is inconsistent about the key, so `error`, `message` and `detail`
/// are tried in that order. Non-JSON or keyless bodies yield `None`.
#[must_use]
pub fn server_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|msg| !msg.is_empty())
        .map(str::to_owned)
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Opaque account identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    /// Returns `None` for empty or whitespace-only input.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() { None } else { Some(Self(trimmed.to_owned())) }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        de_identity(deserializer)?
            .as_deref()
            .and_then(Self::new)
            .ok_or_else(|| serde::de::Error::custom("expected a non-empty account ID"))
    }
}

impl serde::Serialize for AccountId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Accept an identity encoded as either a JSON string or number.
pub(crate) fn de_identity<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// =============================================================================
// AUTH WIRE TYPES
// =============================================================================

/// Body of `POST /authenticated/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthenticatedResponse {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(rename = "accountID", default, deserialize_with = "de_identity")]
    pub account_id: Option<String>,
}

impl AuthenticatedResponse {
    /// The identity, if the server vouched for one.
    #[must_use]
    pub fn identity(&self) -> Option<AccountId> {
        if !self.authenticated {
            return None;
        }
        self.account_id.as_deref().and_then(AccountId::new)
    }
}
