//! The set of live clients.
//!
//! The lock is held only for a map mutation or a snapshot copy, never across
//! network I/O: closing a client only records a close reason, the loops do
//! the actual transport work.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::RwLock;

use crate::{
    domain::{ConnectionId, UserId},
    infrastructure::dto::websocket::UserStatusInfo,
};

use super::client::{Client, CloseReason};

struct Entry {
    /// Registration order, used to pick the most recent connection of a user.
    seq: u64,
    client: Arc<Client>,
}

/// An online user and the connections currently backing that status.
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineUser {
    pub info: UserStatusInfo,
    pub connections: HashSet<ConnectionId>,
}

#[derive(Default)]
pub struct Registry {
    clients: RwLock<HashMap<ConnectionId, Entry>>,
    next_seq: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, client: Arc<Client>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.clients
            .write()
            .await
            .insert(client.id(), Entry { seq, client });
    }

    /// Idempotent. Closes and deletes the client if it is still registered;
    /// returns whether this call removed it.
    pub async fn remove(&self, client: &Client) -> bool {
        let mut clients = self.clients.write().await;
        if clients.remove(&client.id()).is_none() {
            return false;
        }
        client.close(CloseReason::NORMAL);
        true
    }

    pub async fn contains(&self, client: &Client) -> bool {
        self.clients.read().await.contains_key(&client.id())
    }

    /// Most recently registered connection of `user`.
    pub async fn client_by_user_id(&self, user: UserId) -> Option<Arc<Client>> {
        self.clients
            .read()
            .await
            .values()
            .filter(|entry| entry.client.user_id() == user)
            .max_by_key(|entry| entry.seq)
            .map(|entry| entry.client.clone())
    }

    /// Distinct online user ids, ascending.
    pub async fn online_user_ids(&self) -> Vec<UserId> {
        self.online_users()
            .await
            .into_iter()
            .map(|info| info.id)
            .collect()
    }

    /// One entry per online user, ascending by id.
    pub async fn online_users(&self) -> Vec<UserStatusInfo> {
        self.online_connections()
            .await
            .into_iter()
            .map(|user| user.info)
            .collect()
    }

    /// Like [`Registry::online_users`], with each user's live connection ids.
    ///
    /// A shared lock is enough: the snapshot only copies entries, and writers
    /// are excluded for its whole duration.
    pub async fn online_connections(&self) -> Vec<OnlineUser> {
        let clients = self.clients.read().await;
        let mut by_user: BTreeMap<UserId, OnlineUser> = BTreeMap::new();
        for entry in clients.values() {
            by_user
                .entry(entry.client.user_id())
                .or_insert_with(|| OnlineUser {
                    info: entry.client.status_info(),
                    connections: HashSet::new(),
                })
                .connections
                .insert(entry.client.id());
        }
        by_user.into_values().collect()
    }

    pub async fn online_users_except(&self, user: UserId) -> Vec<UserStatusInfo> {
        let mut users = self.online_users().await;
        users.retain(|info| info.id != user);
        users
    }

    pub async fn clients(&self) -> Vec<Arc<Client>> {
        self.clients
            .read()
            .await
            .values()
            .map(|entry| entry.client.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Signal every client to close; their loops deregister them.
    pub async fn close_all(&self) -> usize {
        let clients = self.clients.read().await;
        for entry in clients.values() {
            entry.client.close(CloseReason::NORMAL);
        }
        clients.len()
    }
}
