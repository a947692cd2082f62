//! Store trait 定義
//!
//! リアルタイム層が必要とする永続化のインターフェース。
//! 具体的な実装は Infrastructure 層が提供する（依存性の逆転）。
//! Store は独立して同期されている外部サービスとして扱い、タイムアウトも Store 側が持つ。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{
    ConversationId, GroupId, MessageId, Notification, StoreError, User, UserId,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Resolve a session token to its user; `Ok(None)` when unknown or revoked.
    async fn validate_session(&self, token: &str) -> Result<Option<User>, StoreError>;

    /// Receiver has a public profile, or a follow exists in either direction.
    async fn can_message(&self, sender: UserId, receiver: UserId) -> Result<bool, StoreError>;

    async fn is_group_member(&self, group: GroupId, user: UserId) -> Result<bool, StoreError>;

    async fn group_member_ids(&self, group: GroupId) -> Result<Vec<UserId>, StoreError>;

    /// Conversation between two users, independent of argument order.
    async fn find_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<ConversationId>, StoreError>;

    async fn create_conversation(
        &self,
        a: UserId,
        b: UserId,
        at: DateTime<Utc>,
    ) -> Result<ConversationId, StoreError>;

    async fn touch_conversation(
        &self,
        conversation: ConversationId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<MessageId, StoreError>;

    async fn insert_group_message(
        &self,
        group: GroupId,
        sender: UserId,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<MessageId, StoreError>;

    async fn create_notification(
        &self,
        user: UserId,
        kind: &str,
        payload: Value,
    ) -> Result<Notification, StoreError>;

    /// Pull-based listing, newest first.
    async fn notifications_for(&self, user: UserId) -> Result<Vec<Notification>, StoreError>;
}
