//! Message-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a message was authored by the session's own user or the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// A single chat message.
///
/// Delivered identically by the REST history endpoint and the realtime
/// `message_received` event; `id` is stable across both, which is what
/// makes cross-source deduplication possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Direction relative to the given session user.
    ///
    /// Computed on every call rather than stored on the message: the owning
    /// session can change (logout/login), which would invalidate a cached
    /// value.
    pub fn direction(&self, own_user_id: &str) -> Direction {
        if self.sender_id == own_user_id {
            Direction::Sent
        } else {
            Direction::Received
        }
    }
}

/// Pagination metadata from the messages endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

/// One fetched page of messages.
///
/// Produced by a single fetch, consumed immediately by the synchronizer,
/// then discarded. `pagination` is `None` when the backend omits metadata.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: Option<Pagination>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str) -> Message {
        Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: sender.into(),
            content: "hi".into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_direction_tracks_session_user() {
        let m = msg("alice");
        assert_eq!(m.direction("alice"), Direction::Sent);
        // Same message, different session owner.
        assert_eq!(m.direction("bob"), Direction::Received);
    }

    #[test]
    fn test_message_wire_format() {
        let json = r#"{
            "id": "abc",
            "conversationId": "conv-1",
            "senderId": "u-2",
            "content": "hello",
            "isRead": true,
            "createdAt": "2024-03-01T10:00:00Z"
        }"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.conversation_id, "conv-1");
        assert_eq!(m.sender_id, "u-2");
        assert!(m.is_read);
    }
}
