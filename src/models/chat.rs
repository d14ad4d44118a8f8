//! Conversation records and their peer-facing projection

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Message, User};

/// Raw conversation record from the REST backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// Participant records; some backend versions return them populated
    /// here, others under `participantDetails`.
    #[serde(default)]
    pub participants: Vec<User>,
    #[serde(default)]
    pub participant_details: Vec<User>,
    pub last_message: Option<String>,
    pub last_message_details: Option<Message>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// The participant that is not the session user.
    pub fn peer(&self, own_user_id: &str) -> Option<&User> {
        let pool = if self.participant_details.is_empty() {
            &self.participants
        } else {
            &self.participant_details
        };
        pool.iter().find(|p| p.id != own_user_id)
    }
}

/// Peer-facing projection of a conversation, as shown in the sidebar.
///
/// `id` is the peer's user id (presence events key on it); the conversation
/// itself is reachable through `conversation_id`. Each refresh of the
/// conversation list rebuilds these wholesale; entries are never merged in
/// place.
#[derive(Debug, Clone)]
pub struct ChatUser {
    pub id: String,
    pub conversation_id: String,
    pub name: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread: u32,
    pub online: bool,
}

impl ChatUser {
    /// Project a conversation record for display.
    pub fn project(conv: &Conversation, own_user_id: &str) -> Self {
        let preview = conv
            .last_message_details
            .as_ref()
            .map(|m| m.content.clone())
            .or_else(|| conv.last_message.clone());

        match conv.peer(own_user_id) {
            Some(peer) => Self {
                id: peer.id.clone(),
                conversation_id: conv.id.clone(),
                name: peer.username.clone(),
                last_message: preview,
                last_message_at: conv.last_message_at,
                unread: 0,
                online: false,
            },
            None => Self {
                id: conv.id.clone(),
                conversation_id: conv.id.clone(),
                name: "Unknown user".to_string(),
                last_message: preview,
                last_message_at: conv.last_message_at,
                unread: 0,
                online: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.into(),
            username: name.into(),
            email: None,
            is_active: true,
            last_seen: None,
        }
    }

    #[test]
    fn test_project_picks_other_participant() {
        let conv = Conversation {
            id: "conv-1".into(),
            participants: vec![user("me", "myself"), user("u2", "bob")],
            participant_details: vec![],
            last_message: Some("see you".into()),
            last_message_details: None,
            last_message_at: None,
        };

        let cu = ChatUser::project(&conv, "me");
        assert_eq!(cu.id, "u2");
        assert_eq!(cu.name, "bob");
        assert_eq!(cu.conversation_id, "conv-1");
        assert_eq!(cu.last_message.as_deref(), Some("see you"));
    }

    #[test]
    fn test_project_without_peer_falls_back() {
        let conv = Conversation {
            id: "conv-2".into(),
            participants: vec![],
            participant_details: vec![],
            last_message: None,
            last_message_details: None,
            last_message_at: None,
        };

        let cu = ChatUser::project(&conv, "me");
        assert_eq!(cu.name, "Unknown user");
        assert_eq!(cu.conversation_id, "conv-2");
    }
}
