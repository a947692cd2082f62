//! WebSocket wire types.
//!
//! Every frame is a JSON text frame shaped `{"type": "<tag>", "payload": {...}}`.
//! Inbound payloads stay as raw JSON until the tag has selected a handler, so a
//! schema problem in one event type is reported by that handler only.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{GroupId, NotificationId, PresenceStatus, UserId};

/// Event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SendMessage,
    ReceiveMessage,
    SendTyping,
    NewTyping,
    SendGroupMessage,
    ReceiveGroupMessage,
    UserStatusUpdate,
    Notification,
    Error,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        Self::SendMessage,
        Self::ReceiveMessage,
        Self::SendTyping,
        Self::NewTyping,
        Self::SendGroupMessage,
        Self::ReceiveGroupMessage,
        Self::UserStatusUpdate,
        Self::Notification,
        Self::Error,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::ReceiveMessage => "receive_message",
            Self::SendTyping => "send_typing",
            Self::NewTyping => "new_typing",
            Self::SendGroupMessage => "send_group_message",
            Self::ReceiveGroupMessage => "receive_group_message",
            Self::UserStatusUpdate => "user_status_update",
            Self::Notification => "notification",
            Self::Error => "error",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }
}

/// Envelope as read from a client. The tag is kept as a string so unknown
/// tags surface as an unsupported event rather than a decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Envelope queued on a Client's egress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
}

impl OutboundEnvelope {
    pub fn new<T: Serialize>(event_type: EventType, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type,
            payload: serde_json::to_value(payload)?,
        })
    }
}

// ========================================
// Inbound payloads
// ========================================

/// `send_message`. Missing fields default so they fail validation with a
/// field-level error instead of a schema error.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub receiver_id: i64,
    #[serde(default)]
    pub session_token: Option<String>,
}

/// `send_group_message`
#[derive(Debug, Clone, Deserialize)]
pub struct SendGroupMessagePayload {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub group_id: i64,
}

/// `send_typing`
#[derive(Debug, Clone, Deserialize)]
pub struct SendTypingPayload {
    pub receiver_id: i64,
    pub is_typing: bool,
}

// ========================================
// Outbound payloads
// ========================================

/// `receive_message`, delivered to the receiver and echoed to the sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiveMessagePayload {
    pub message: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub sent_at: String,
}

/// `receive_group_message`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiveGroupMessagePayload {
    pub message: String,
    pub sender_id: UserId,
    pub group_id: GroupId,
    pub sent_at: String,
}

/// `new_typing`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTypingPayload {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub is_typing: bool,
}

/// One user's entry in a presence update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatusInfo {
    pub id: UserId,
    pub display_name: String,
    pub status: PresenceStatus,
}

/// `user_status_update`, used both for the connect-time snapshot and for
/// periodic diffs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStatusUpdate {
    pub online_users: Vec<UserStatusInfo>,
    pub offline_user_ids: Vec<UserId>,
}

impl UserStatusUpdate {
    pub fn is_empty(&self) -> bool {
        self.online_users.is_empty() && self.offline_user_ids.is_empty()
    }

    /// Copy with every entry about `user` removed.
    pub fn without_user(&self, user: UserId) -> Self {
        Self {
            online_users: self
                .online_users
                .iter()
                .filter(|info| info.id != user)
                .cloned()
                .collect(),
            offline_user_ids: self
                .offline_user_ids
                .iter()
                .copied()
                .filter(|id| *id != user)
                .collect(),
        }
    }
}

/// `notification`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEventPayload {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub is_read: bool,
    pub created_at: String,
}

/// Machine-readable codes carried by `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    SelfMessage,
    MessageNotAllowed,
    ReceiverOffline,
    GroupMessageForbidden,
    SelfTyping,
}

/// `error`; context keys are flattened next to `code` and `message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEventPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(flatten)]
    pub context: Map<String, Value>,
}
