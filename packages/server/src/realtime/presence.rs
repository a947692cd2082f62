//! Periodic presence diffs.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::watch,
    time::{Instant, interval_at},
};

use crate::{
    domain::{ConnectionId, UserId},
    infrastructure::dto::websocket::{EventType, UserStatusUpdate},
};

use super::registry::{OnlineUser, Registry};

/// Remembers who was online at the previous tick, and through which
/// connections.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    previous: HashMap<UserId, HashSet<ConnectionId>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against the previous snapshot, then replace the
    /// snapshot wholesale with `current`.
    ///
    /// A user is newly online when they were absent before or came back on
    /// a connection the previous snapshot did not have (a reconnect between
    /// two ticks). A user is newly offline when they have no connection left.
    pub fn diff(&mut self, current: Vec<OnlineUser>) -> UserStatusUpdate {
        let mut online_users = Vec::new();
        let mut snapshot = HashMap::with_capacity(current.len());
        for user in current {
            let fresh = match self.previous.get(&user.info.id) {
                Some(before) => !user.connections.is_subset(before),
                None => true,
            };
            snapshot.insert(user.info.id, user.connections);
            if fresh {
                online_users.push(user.info);
            }
        }
        online_users.sort_by_key(|info| info.id);

        let mut offline_user_ids: Vec<UserId> = self
            .previous
            .keys()
            .filter(|id| !snapshot.contains_key(id))
            .copied()
            .collect();
        offline_user_ids.sort();

        self.previous = snapshot;

        UserStatusUpdate {
            online_users,
            offline_user_ids,
        }
    }
}

/// Ticker task fanning presence diffs out to every connected client.
pub struct PresenceBroadcaster {
    stop: watch::Sender<bool>,
}

impl PresenceBroadcaster {
    pub fn start(registry: Arc<Registry>, period: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        tokio::spawn(async move {
            let mut tracker = PresenceTracker::new();
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        broadcast_tick(&registry, &mut tracker).await;
                    }
                }
            }
            tracing::debug!("presence broadcaster stopped");
        });

        Self { stop }
    }

    /// Fire-and-forget; the task exits at its next wake-up.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

/// One presence tick. Returns how many clients were sent an update.
pub async fn broadcast_tick(registry: &Registry, tracker: &mut PresenceTracker) -> usize {
    let update = tracker.diff(registry.online_connections().await);
    if update.is_empty() {
        return 0;
    }
    tracing::debug!(
        online = update.online_users.len(),
        offline = update.offline_user_ids.len(),
        "presence changed"
    );

    let mut delivered = 0;
    for client in registry.clients().await {
        let filtered = update.without_user(client.user_id());
        if filtered.is_empty() {
            continue;
        }
        if client.send_event(EventType::UserStatusUpdate, &filtered) {
            delivered += 1;
        }
    }
    delivered
}
