//! Entities owned by the Store and observed by the live core.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::value_object::{NotificationId, UserId};

/// A user as resolved from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// Public profiles can be messaged by anyone.
    pub is_public: bool,
}

impl User {
    pub fn new(id: UserId, display_name: impl Into<String>, is_public: bool) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_public,
        }
    }
}

/// Notification type tags written to the Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    DirectMessage,
    GroupMessage,
}

impl NotificationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::GroupMessage => "group_message",
        }
    }
}

/// Durable notification. The live core creates and reads these but never
/// touches `is_read`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: String,
    pub payload: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Presence status as carried on the wire (numeric).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum PresenceStatus {
    Offline,
    Online,
    Busy,
    DoNotDisturb,
}

impl From<PresenceStatus> for u8 {
    fn from(status: PresenceStatus) -> Self {
        match status {
            PresenceStatus::Offline => 0,
            PresenceStatus::Online => 1,
            PresenceStatus::Busy => 2,
            PresenceStatus::DoNotDisturb => 3,
        }
    }
}
