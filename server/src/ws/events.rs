//! Gateway Events
//!
//! Both directions are JSON objects `{"type": <name>, "data": <payload>}`.
//! Event names and payload field names are camelCase.

use mm_common::{PresenceEntry, UserStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Message;

/// Client-to-server events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Keepalive
    Ping,
    /// Change own presence status
    UpdateStatus { status: UserStatus },
    /// Typing indicator towards one user
    Typing { receiver_id: Uuid },
    StopTyping { receiver_id: Uuid },
    /// Relay a reaction to the other side of a DM
    MessageReaction {
        message_id: Uuid,
        reaction: String,
        receiver_id: Uuid,
    },
    /// Relay a read receipt to the other side of a DM
    MessageRead { message_id: Uuid, receiver_id: Uuid },
    /// Subscribe to a group channel
    JoinGroup(String),
    /// Unsubscribe from a group channel
    LeaveGroup(String),
}

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Connection authenticated
    Ready { user_id: Uuid },
    /// Reply to `ping`
    Pong,
    /// Full online-user list
    GetOnlineUsers(Vec<PresenceEntry>),
    UserStatusChanged { user_id: Uuid, status: UserStatus },
    UserTyping { user_id: Uuid },
    UserStoppedTyping { user_id: Uuid },
    /// Direct message for the receiver
    NewMessage(Box<Message>),
    /// Message posted to a group channel
    NewGroupMessage(Box<Message>),
    MessageEdited(Box<Message>),
    MessageDeleted {
        message_id: Uuid,
        group_id: Option<Uuid>,
    },
    NewReaction {
        message_id: Uuid,
        reaction: String,
        user_id: Uuid,
    },
    MessageReadBy { message_id: Uuid, user_id: Uuid },
    /// Malformed client event
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Wire name, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Pong => "pong",
            Self::GetOnlineUsers(_) => "getOnlineUsers",
            Self::UserStatusChanged { .. } => "userStatusChanged",
            Self::UserTyping { .. } => "userTyping",
            Self::UserStoppedTyping { .. } => "userStoppedTyping",
            Self::NewMessage(_) => "newMessage",
            Self::NewGroupMessage(_) => "newGroupMessage",
            Self::MessageEdited(_) => "messageEdited",
            Self::MessageDeleted { .. } => "messageDeleted",
            Self::NewReaction { .. } => "newReaction",
            Self::MessageReadBy { .. } => "messageReadBy",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::Recipient;

    #[test]
    fn test_client_event_names() {
        let receiver = Uuid::now_v7();
        let parsed: ClientEvent = serde_json::from_value(json!({
            "type": "stopTyping",
            "data": { "receiverId": receiver }
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientEvent::StopTyping {
                receiver_id: receiver
            }
        );

        let parsed: ClientEvent =
            serde_json::from_value(json!({ "type": "joinGroup", "data": "g1" })).unwrap();
        assert_eq!(parsed, ClientEvent::JoinGroup("g1".into()));

        let parsed: ClientEvent = serde_json::from_value(json!({ "type": "ping" })).unwrap();
        assert_eq!(parsed, ClientEvent::Ping);
    }

    #[test]
    fn test_server_event_payloads() {
        let user = Uuid::now_v7();
        let json = serde_json::to_value(ServerEvent::UserStatusChanged {
            user_id: user,
            status: UserStatus::Away,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({
                "type": "userStatusChanged",
                "data": { "userId": user, "status": "away" }
            })
        );

        let json = serde_json::to_value(ServerEvent::GetOnlineUsers(vec![PresenceEntry {
            user_id: user,
            status: UserStatus::Online,
        }]))
        .unwrap();
        assert_eq!(json["type"], "getOnlineUsers");
        assert_eq!(json["data"][0]["userId"], user.to_string());
    }

    #[test]
    fn test_new_message_carries_full_record() {
        let msg = Message::new(Uuid::now_v7(), Recipient::User(Uuid::now_v7()), "hello");
        let event = ServerEvent::NewMessage(Box::new(msg.clone()));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "newMessage");
        assert_eq!(json["data"]["content"], "hello");
        assert_eq!(json["data"]["id"], msg.id.to_string());
        assert_eq!(event.name(), "newMessage");
    }
}
