//! User listing endpoints

use anyhow::Result;
use serde::Deserialize;

use super::client::ApiClient;
use crate::models::{OnlineUser, User};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UsersData {
    Nested { users: Vec<User> },
    Bare(Vec<User>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OnlineData {
    Nested {
        #[serde(rename = "onlineUsers")]
        online_users: Vec<OnlineUser>,
    },
    Bare(Vec<OnlineUser>),
}

/// All registered users.
pub async fn list(client: &ApiClient) -> Result<Vec<User>> {
    let resp: super::client::ApiResponse<UsersData> = client.get("/users/list").await?;
    Ok(match resp.data {
        Some(UsersData::Nested { users }) => users,
        Some(UsersData::Bare(users)) => users,
        None => Vec::new(),
    })
}

/// Ids of currently online users. This is the presence snapshot fetched on
/// every (re)connection; incremental events alone cannot reconstruct the
/// roster after a gap.
pub async fn online_ids(client: &ApiClient) -> Result<Vec<String>> {
    let resp: super::client::ApiResponse<OnlineData> = client.get("/users/online/list").await?;
    let users = match resp.data {
        Some(OnlineData::Nested { online_users }) => online_users,
        Some(OnlineData::Bare(users)) => users,
        None => Vec::new(),
    };
    Ok(users.into_iter().map(|u| u.user_id).collect())
}
