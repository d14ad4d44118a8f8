//! Conversation endpoints

use anyhow::{Context, Result};

use super::client::{ApiClient, ApiError};
use crate::models::{ChatUser, Conversation};
use crate::sync::session::ConversationResolver;

/// Fetch all conversations and project them for display.
///
/// The projected list is rebuilt wholesale on every refresh.
pub async fn list(client: &ApiClient) -> Result<Vec<ChatUser>> {
    let own_id = client.user_id().ok_or(ApiError::NotLoggedIn)?;

    let resp: super::client::ApiResponse<Vec<Conversation>> =
        client.get("/conversations").await?;
    let conversations = resp.data.unwrap_or_default();

    tracing::debug!("Fetched {} conversations", conversations.len());
    Ok(conversations
        .iter()
        .map(|c| ChatUser::project(c, &own_id))
        .collect())
}

/// Resolve the existing-or-created conversation with a peer user.
pub async fn create_or_get(client: &ApiClient, participant_id: &str) -> Result<ChatUser> {
    let own_id = client.user_id().ok_or(ApiError::NotLoggedIn)?;

    let body = serde_json::json!({ "participantId": participant_id });
    let resp: super::client::ApiResponse<Conversation> =
        client.post("/conversations", &body).await?;
    let conversation = resp.into_data().context("Conversation create failed")?;

    Ok(ChatUser::project(&conversation, &own_id))
}

/// The session controller's resolution seam, backed by the REST endpoint.
impl ConversationResolver for ApiClient {
    async fn resolve(&self, peer_user_id: &str) -> Result<ChatUser> {
        create_or_get(self, peer_user_id).await
    }
}
