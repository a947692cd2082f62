//! Event dispatch by wire tag.

use std::sync::Arc;

use tsunagi_shared::time::Clock;

use crate::{
    domain::Store,
    infrastructure::dto::websocket::{EventType, InboundEnvelope},
    usecase::{SendDirectMessageUseCase, SendGroupMessageUseCase, SendTypingUseCase},
};

use super::{Client, NotificationBridge, RealtimeError, Registry};

/// Closed dispatch over the inbound event types. Outbound-only tags and
/// unknown tags are unsupported.
pub struct EventRouter {
    direct_message: SendDirectMessageUseCase,
    group_message: SendGroupMessageUseCase,
    typing: SendTypingUseCase,
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<Registry>,
        bridge: Arc<NotificationBridge>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            direct_message: SendDirectMessageUseCase::new(
                store.clone(),
                registry.clone(),
                bridge.clone(),
                clock.clone(),
            ),
            group_message: SendGroupMessageUseCase::new(store, registry.clone(), bridge, clock),
            typing: SendTypingUseCase::new(registry),
        }
    }

    /// Runs the handler on the caller's task.
    pub async fn route(
        &self,
        envelope: InboundEnvelope,
        client: &Arc<Client>,
    ) -> Result<(), RealtimeError> {
        let event_type = EventType::from_tag(&envelope.event_type)
            .ok_or_else(|| RealtimeError::UnsupportedEvent(envelope.event_type.clone()))?;

        match event_type {
            EventType::SendMessage => self.direct_message.execute(client, envelope.payload).await,
            EventType::SendGroupMessage => self
                .group_message
                .execute(client, envelope.payload)
                .await
                .map(|_| ()),
            EventType::SendTyping => self
                .typing
                .execute(client, envelope.payload)
                .await
                .map(|_| ()),
            EventType::ReceiveMessage
            | EventType::NewTyping
            | EventType::ReceiveGroupMessage
            | EventType::UserStatusUpdate
            | EventType::Notification
            | EventType::Error => Err(RealtimeError::UnsupportedEvent(
                envelope.event_type,
            )),
        }
    }
}
