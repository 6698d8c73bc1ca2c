//! Chat hub event types.
//!
//! `ClientEvent` is what a connection sends to the hub, `ServerEvent` what
//! the hub pushes back. Both are transport-agnostic; see [`crate::codec`]
//! for how they map onto wire frames.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::generate_message_id;

/// Opaque per-link handle assigned by the transport on accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat message as delivered to every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
}

impl ChatMessage {
    /// Build a message stamped with a fresh id and the current time.
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            author: author.into(),
            text: text.into(),
            ts: Utc::now().timestamp_millis(),
        }
    }
}

/// Kind of a [`SystemNotice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Join,
    Leave,
    Error,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Error => "error",
        }
    }
}

/// Join/leave announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub text: String,
}

/// Relayed typing indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingState {
    pub name: String,
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
    pub id: ConnectionId,
}

/// Events a connection sends to the hub.
///
/// Payloads are raw and untrusted; the session handler validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join { name: String },
    ChatMessage { text: String },
    Typing { is_typing: bool },
}

impl ClientEvent {
    /// Event name on the Socket.IO-style wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::ChatMessage { .. } => "chat_message",
            Self::Typing { .. } => "typing",
        }
    }
}

/// Events the hub pushes to connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Join acknowledgment, sent only to the joining connection.
    Joined { name: String },
    ChatMessage(ChatMessage),
    SystemMessage(SystemNotice),
    Typing(TypingState),
    OnlineCount { count: usize },
    /// Error notice, sent only to the offending connection.
    ErrorMessage(String),
}

impl ServerEvent {
    /// Event name on the Socket.IO-style wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::ChatMessage(_) => "chat_message",
            Self::SystemMessage(_) => "system_message",
            Self::Typing(_) => "typing",
            Self::OnlineCount { .. } => "online_count",
            Self::ErrorMessage(_) => "error_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_is_stamped_now() {
        let before = Utc::now().timestamp_millis();
        let msg = ChatMessage::new("Ann", "hi");
        let after = Utc::now().timestamp_millis();
        assert!(msg.ts >= before && msg.ts <= after);
        assert_eq!(msg.author, "Ann");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn typing_state_uses_camel_case_flag() {
        let state = TypingState {
            name: "Ann".into(),
            is_typing: true,
            id: ConnectionId(7),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Ann", "isTyping": true, "id": 7}));
    }

    #[test]
    fn notice_kind_serializes_as_type() {
        let notice = SystemNotice {
            kind: NoticeKind::Leave,
            text: "Bob left".into(),
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["type"], "leave");
    }
}
