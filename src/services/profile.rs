//! User profiles as shown in the sidebar and profile page.

use serde::{Deserialize, Serialize};

use super::segment;
use crate::net::api::ApiClient;
use crate::net::types::{AccountId, ApiResult};

#[cfg(test)]
#[path = "profile_test.rs"]
mod profile_test;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub bio: String,
    /// Profile picture URL.
    #[serde(default)]
    pub pfp: Option<String>,
    /// The profile belongs to the current user.
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub societies: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[must_use]
pub fn profile_endpoint(account: &AccountId) -> String {
    format!("/Profile/{}/", segment(account.as_str()))
}

/// # Errors
///
/// See [`ApiClient::request`].
pub async fn fetch_profile(api: &ApiClient, account: &AccountId) -> ApiResult<UserProfile> {
    api.get(&profile_endpoint(account)).await
}
