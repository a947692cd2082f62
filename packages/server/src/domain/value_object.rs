//! Value objects.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::validator::{max_runes, not_blank};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn value(self) -> i64 {
                self.0
            }

            /// Store identifiers start at 1.
            pub const fn is_valid(self) -> bool {
                self.0 > 0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Numeric user identifier issued by the Store.
    UserId
);
numeric_id!(
    /// Group identifier.
    GroupId
);
numeric_id!(
    /// Direct conversation between two users.
    ConversationId
);
numeric_id!(MessageId);
numeric_id!(NotificationId);

/// Identity of one live connection.
///
/// A user may hold several connections, so the Registry is keyed by this rather
/// than by `UserId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Reasons a message body is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageBodyError {
    #[error("Message cannot be empty")]
    Blank,

    #[error("Message is too long (maximum {max} characters)")]
    TooLong { max: usize, actual: usize },
}

/// Text of a direct message: non-blank and at most [`MessageBody::MAX_RUNES`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MessageBody(String);

impl MessageBody {
    pub const MAX_RUNES: usize = 250;

    pub fn new(value: String) -> Result<Self, MessageBodyError> {
        if !not_blank(&value) {
            return Err(MessageBodyError::Blank);
        }
        if !max_runes(&value, Self::MAX_RUNES) {
            return Err(MessageBodyError::TooLong {
                max: Self::MAX_RUNES,
                actual: value.chars().count(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageBody {
    type Error = MessageBodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_validity() {
        // テスト項目: 正の値のみ有効なユーザー ID とみなされる
        // given (前提条件):
        let ids = [UserId::new(1), UserId::new(0), UserId::new(-3)];

        // when (操作):
        let validity: Vec<bool> = ids.iter().map(|id| id.is_valid()).collect();

        // then (期待する結果):
        assert_eq!(validity, vec![true, false, false]);
    }

    #[test]
    fn test_message_body_accepts_exactly_max_runes() {
        // テスト項目: 250 文字（マルチバイト含む）のメッセージは受け入れられる
        // given (前提条件):
        let text = "あ".repeat(MessageBody::MAX_RUNES);

        // when (操作):
        let result = MessageBody::new(text.clone());

        // then (期待する結果):
        assert_eq!(result.map(MessageBody::into_string), Ok(text));
    }

    #[test]
    fn test_message_body_rejects_251_runes() {
        // テスト項目: 251 文字のメッセージは TooLong で拒否される
        // given (前提条件):
        let text = "x".repeat(251);

        // when (操作):
        let result = MessageBody::new(text);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(MessageBodyError::TooLong {
                max: 250,
                actual: 251
            })
        );
    }

    #[test]
    fn test_message_body_rejects_whitespace_only() {
        // テスト項目: 空白のみのメッセージは Blank で拒否される
        // given (前提条件):
        let text = " \t\n ".to_string();

        // when (操作):
        let result = MessageBody::try_from(text);

        // then (期待する結果):
        assert_eq!(result, Err(MessageBodyError::Blank));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        // テスト項目: 生成される接続 ID は毎回異なる
        // given (前提条件):

        // when (操作):
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        // then (期待する結果):
        assert_ne!(a, b);
    }
}
