//! Message history endpoint

use anyhow::Result;
use serde::Deserialize;

use super::client::ApiClient;
use crate::models::{Message, MessagePage};
use crate::sync::MessageFetcher;

/// `data` payload: some backend versions nest the array under `messages`,
/// others return the array directly.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessagesData {
    Nested { messages: Vec<Message> },
    Bare(Vec<Message>),
}

/// Fetch one page of a conversation's history, newest page first.
pub async fn fetch_page(
    client: &ApiClient,
    conversation_id: &str,
    page: u32,
    limit: u32,
) -> Result<MessagePage> {
    let path = format!(
        "/messages/conversations/{}?page={}&limit={}",
        conversation_id, page, limit
    );
    let resp: super::client::ApiResponse<MessagesData> = client.get(&path).await?;

    let pagination = resp.pagination.clone();
    let messages = match resp.data {
        Some(MessagesData::Nested { messages }) => messages,
        Some(MessagesData::Bare(messages)) => messages,
        None => Vec::new(),
    };

    tracing::debug!(
        "Fetched page {} of conversation {}: {} messages (meta: {:?})",
        page,
        conversation_id,
        messages.len(),
        pagination
    );

    Ok(MessagePage {
        messages,
        pagination,
    })
}

/// The synchronizer's fetch seam, backed by the REST endpoint.
impl MessageFetcher for ApiClient {
    async fn fetch_page(&self, conversation_id: &str, page: u32, limit: u32) -> Result<MessagePage> {
        fetch_page(self, conversation_id, page, limit).await
    }
}
