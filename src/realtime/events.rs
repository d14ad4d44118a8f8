//! Named realtime events and their wire payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Message;

// Inbound event names.
pub const MESSAGE_RECEIVED: &str = "message_received";
pub const USER_ONLINE: &str = "user_online";
pub const USER_OFFLINE: &str = "user_offline";
pub const USER_TYPING: &str = "user_typing";
pub const USER_STOPPED_TYPING: &str = "user_stopped_typing";
pub const JOINED_ROOM: &str = "joined_room";

// Synthetic connection-level events dispatched by the ConnectionManager
// itself, never received on the wire.
pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";

// Outbound event names.
pub const JOIN_ROOM: &str = "join_room";
pub const SEND_MESSAGE: &str = "send_message";
pub const TYPING_START: &str = "typing_start";
pub const TYPING_STOP: &str = "typing_stop";

/// One WebSocket frame: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Payload of `message_received`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub message: Message,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_automatic: bool,
}

/// Payload of `user_online` / `user_offline`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusEvent {
    pub user_id: String,
    pub username: Option<String>,
}

/// Payload of `user_typing` / `user_stopped_typing`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub user_id: String,
    pub conversation_id: String,
    pub username: Option<String>,
}

/// Payload of `joined_room`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEvent {
    pub conversation_id: String,
}

/// A fully parsed inbound event, for consumers that want one typed inbox
/// instead of per-name handlers.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Message(MessageEvent),
    UserOnline(UserStatusEvent),
    UserOffline(UserStatusEvent),
    Typing(TypingEvent),
    StoppedTyping(TypingEvent),
    JoinedRoom(RoomEvent),
    Connected,
    Disconnected,
}

impl ServerEvent {
    /// Parse a named payload into a typed event. Unknown names and
    /// malformed payloads yield `None` (logged by the caller).
    pub fn parse(name: &str, data: serde_json::Value) -> Option<ServerEvent> {
        let event = match name {
            MESSAGE_RECEIVED => ServerEvent::Message(serde_json::from_value(data).ok()?),
            USER_ONLINE => ServerEvent::UserOnline(serde_json::from_value(data).ok()?),
            USER_OFFLINE => ServerEvent::UserOffline(serde_json::from_value(data).ok()?),
            USER_TYPING => ServerEvent::Typing(serde_json::from_value(data).ok()?),
            USER_STOPPED_TYPING => ServerEvent::StoppedTyping(serde_json::from_value(data).ok()?),
            JOINED_ROOM => ServerEvent::JoinedRoom(serde_json::from_value(data).ok()?),
            CONNECTED => ServerEvent::Connected,
            DISCONNECTED => ServerEvent::Disconnected,
            _ => return None,
        };
        Some(event)
    }
}

/// Payload for `join_room`.
pub fn join_room(conversation_id: &str) -> serde_json::Value {
    serde_json::json!({ "conversationId": conversation_id })
}

/// Payload for `send_message`.
pub fn send_message(conversation_id: &str, content: &str) -> serde_json::Value {
    serde_json::json!({ "conversationId": conversation_id, "content": content })
}

/// Payload for `typing_start` / `typing_stop`.
pub fn typing(conversation_id: &str) -> serde_json::Value {
    serde_json::json!({ "conversationId": conversation_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_received() {
        let data = serde_json::json!({
            "message": {
                "id": "m1",
                "conversationId": "c1",
                "senderId": "u2",
                "content": "hey",
                "createdAt": "2024-03-01T10:00:00Z"
            },
            "timestamp": "2024-03-01T10:00:00Z"
        });

        match ServerEvent::parse(MESSAGE_RECEIVED, data) {
            Some(ServerEvent::Message(ev)) => {
                assert_eq!(ev.message.id, "m1");
                assert_eq!(ev.message.conversation_id, "c1");
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_typing_event() {
        let data = serde_json::json!({ "userId": "u2", "conversationId": "c1" });
        match ServerEvent::parse(USER_TYPING, data) {
            Some(ServerEvent::Typing(ev)) => {
                assert_eq!(ev.user_id, "u2");
                assert_eq!(ev.conversation_id, "c1");
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_event() {
        assert!(ServerEvent::parse("reaction_added", serde_json::json!({})).is_none());
    }

    #[test]
    fn test_parse_malformed_payload() {
        // user_online without a userId field.
        assert!(ServerEvent::parse(USER_ONLINE, serde_json::json!({ "nope": 1 })).is_none());
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = EventFrame {
            event: SEND_MESSAGE.to_string(),
            data: send_message("c1", "hello"),
        };
        let text = serde_json::to_string(&frame).unwrap();
        let back: EventFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event, SEND_MESSAGE);
        assert_eq!(back.data["conversationId"], "c1");
    }
}
