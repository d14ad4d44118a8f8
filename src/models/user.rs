//! User-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User record from `/users/list` or embedded in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// The authenticated user's own identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Payload of `data` in login/register/refresh responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user: Option<AuthUser>,
    pub access_token: String,
    pub refresh_token: String,
}

/// Entry in `/users/online/list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
    pub username: Option<String>,
}
