//! InMemory Store 実装
//!
//! ドメイン層が定義する Store trait の具体的な実装。
//! HashMap をインメモリ DB として使用する。
//!
//! `set_failing(true)` で書き込み系の操作を全て `StoreError::Backend` にできるため、
//! 永続化失敗時の振る舞いをテストできる。

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tsunagi_shared::time::{Clock, SystemClock};

use crate::domain::{
    ConversationId, GroupId, MessageId, Notification, NotificationId, Store, StoreError, User,
    UserId,
};

/// A persisted direct message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub conversation: ConversationId,
    pub sender: UserId,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// A persisted group message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredGroupMessage {
    pub id: MessageId,
    pub group: GroupId,
    pub sender: UserId,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredConversation {
    participants: (UserId, UserId),
    last_message_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, UserId>,
    /// (follower, followee)
    follows: HashSet<(UserId, UserId)>,
    group_members: HashMap<GroupId, BTreeSet<UserId>>,
    conversations: HashMap<ConversationId, StoredConversation>,
    messages: Vec<StoredMessage>,
    group_messages: Vec<StoredGroupMessage>,
    notifications: Vec<Notification>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// インメモリ Store 実装
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
    failing: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// 新しい InMemoryStore を作成
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            clock,
            failing: AtomicBool::new(false),
        }
    }

    // ========================================
    // Seeding
    // ========================================

    pub async fn add_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn open_session(&self, token: impl Into<String>, user: UserId) {
        self.tables.lock().await.sessions.insert(token.into(), user);
    }

    pub async fn revoke_session(&self, token: &str) {
        self.tables.lock().await.sessions.remove(token);
    }

    pub async fn follow(&self, follower: UserId, followee: UserId) {
        self.tables
            .lock()
            .await
            .follows
            .insert((follower, followee));
    }

    pub async fn add_group_member(&self, group: GroupId, user: UserId) {
        self.tables
            .lock()
            .await
            .group_members
            .entry(group)
            .or_default()
            .insert(user);
    }

    /// Make every write fail with `StoreError::Backend` until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    // ========================================
    // Inspection
    // ========================================

    pub async fn messages(&self) -> Vec<StoredMessage> {
        self.tables.lock().await.messages.clone()
    }

    pub async fn group_messages(&self) -> Vec<StoredGroupMessage> {
        self.tables.lock().await.group_messages.clone()
    }

    pub async fn conversation_last_message_at(
        &self,
        conversation: ConversationId,
    ) -> Option<DateTime<Utc>> {
        self.tables
            .lock()
            .await
            .conversations
            .get(&conversation)
            .map(|c| c.last_message_at)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store is unavailable".to_string()));
        }
        Ok(())
    }
}

fn same_pair(pair: (UserId, UserId), a: UserId, b: UserId) -> bool {
    pair == (a, b) || pair == (b, a)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn validate_session(&self, token: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .get(token)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn can_message(&self, sender: UserId, receiver: UserId) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        let Some(receiver_user) = tables.users.get(&receiver) else {
            return Ok(false);
        };
        if receiver_user.is_public {
            return Ok(true);
        }
        Ok(tables.follows.contains(&(sender, receiver))
            || tables.follows.contains(&(receiver, sender)))
    }

    async fn is_group_member(&self, group: GroupId, user: UserId) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .group_members
            .get(&group)
            .is_some_and(|members| members.contains(&user)))
    }

    async fn group_member_ids(&self, group: GroupId) -> Result<Vec<UserId>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .group_members
            .get(&group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn find_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<ConversationId>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .conversations
            .iter()
            .find(|(_, c)| same_pair(c.participants, a, b))
            .map(|(id, _)| *id))
    }

    async fn create_conversation(
        &self,
        a: UserId,
        b: UserId,
        at: DateTime<Utc>,
    ) -> Result<ConversationId, StoreError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let id = ConversationId::new(tables.next_id());
        tables.conversations.insert(
            id,
            StoredConversation {
                participants: (a, b),
                last_message_at: at,
            },
        );
        Ok(id)
    }

    async fn touch_conversation(
        &self,
        conversation: ConversationId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let stored = tables
            .conversations
            .get_mut(&conversation)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation}")))?;
        stored.last_message_at = at;
        Ok(())
    }

    async fn insert_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<MessageId, StoreError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        if !tables.conversations.contains_key(&conversation) {
            return Err(StoreError::NotFound(format!("conversation {conversation}")));
        }
        let id = MessageId::new(tables.next_id());
        tables.messages.push(StoredMessage {
            id,
            conversation,
            sender,
            body: body.to_string(),
            sent_at: at,
        });
        Ok(id)
    }

    async fn insert_group_message(
        &self,
        group: GroupId,
        sender: UserId,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<MessageId, StoreError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let id = MessageId::new(tables.next_id());
        tables.group_messages.push(StoredGroupMessage {
            id,
            group,
            sender,
            body: body.to_string(),
            sent_at: at,
        });
        Ok(id)
    }

    async fn create_notification(
        &self,
        user: UserId,
        kind: &str,
        payload: Value,
    ) -> Result<Notification, StoreError> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let notification = Notification {
            id: NotificationId::new(tables.next_id()),
            user_id: user,
            kind: kind.to_string(),
            payload,
            is_read: false,
            created_at: self.clock.now(),
        };
        tables.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn notifications_for(&self, user: UserId) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(found)
    }
}
