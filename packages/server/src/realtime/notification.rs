//! Bridge from durable notifications to live clients.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    domain::{Notification, Store, StoreError, UserId},
    infrastructure::dto::websocket::{EventType, NotificationEventPayload},
};

use super::registry::Registry;

pub struct NotificationBridge {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
}

impl NotificationBridge {
    pub fn new(store: Arc<dyn Store>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// Deliver to the user's live client if there is one. Without a live
    /// client the notification stays available through the Store only.
    pub async fn push_notification(&self, notification: &Notification) -> bool {
        let Some(client) = self.registry.client_by_user_id(notification.user_id).await else {
            return false;
        };
        client.send_event(
            EventType::Notification,
            &NotificationEventPayload::from(notification),
        )
    }

    pub async fn create_and_push(
        &self,
        user: UserId,
        kind: &str,
        payload: Value,
    ) -> Result<Notification, StoreError> {
        let notification = self.store.create_notification(user, kind, payload).await?;
        self.push_notification(&notification).await;
        Ok(notification)
    }
}
