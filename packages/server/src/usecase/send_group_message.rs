//! UseCase: グループメッセージ送信処理
//!
//! メンバーであることを確認してから保存し、送信者以外のメンバーに配信する。
//! オンラインのメンバーには直接（キューが満杯なら破棄）、
//! オフラインのメンバーには永続的な通知を作成する。

use std::sync::Arc;

use serde_json::json;
use tsunagi_shared::time::{Clock, to_rfc3339};

use crate::{
    domain::{GroupId, NotificationKind, Store, Validator, validator::not_blank},
    infrastructure::dto::websocket::{
        ErrorCode, EventType, ReceiveGroupMessagePayload, SendGroupMessagePayload,
    },
    realtime::{Client, NotificationBridge, RealtimeError, Registry},
};

use super::{context, decode_payload};

/// グループメッセージ送信のユースケース
pub struct SendGroupMessageUseCase {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    bridge: Arc<NotificationBridge>,
    clock: Arc<dyn Clock>,
}

/// Fan-out result of one group message.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GroupDelivery {
    pub live: usize,
    pub notified: usize,
}

impl SendGroupMessageUseCase {
    /// 新しい SendGroupMessageUseCase を作成
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<Registry>,
        bridge: Arc<NotificationBridge>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            bridge,
            clock,
        }
    }

    pub async fn execute(
        &self,
        sender: &Arc<Client>,
        payload: serde_json::Value,
    ) -> Result<GroupDelivery, RealtimeError> {
        let request: SendGroupMessagePayload = decode_payload(payload)?;
        let group_id = GroupId::new(request.group_id);
        let group_context = context("group_id", request.group_id);

        let mut v = Validator::new();
        v.check_field(
            not_blank(&request.message),
            "message",
            "Message cannot be empty",
        );
        v.check_field(group_id.is_valid(), "group_id", "Invalid group ID");
        if v.has_errors() {
            for (field, message) in v.into_errors() {
                sender.reject(
                    &RealtimeError::Validation { field, message },
                    group_context.clone(),
                );
            }
            return Ok(GroupDelivery::default());
        }

        let user_id = sender.user_id();
        if !self.store.is_group_member(group_id, user_id).await? {
            sender.reject(
                &RealtimeError::Permission {
                    code: ErrorCode::GroupMessageForbidden,
                    message: "You are not a member of this group".to_string(),
                },
                group_context,
            );
            return Ok(GroupDelivery::default());
        }

        let sent_at = self.clock.now();
        self.store
            .insert_group_message(group_id, user_id, &request.message, sent_at)
            .await?;

        let event = ReceiveGroupMessagePayload {
            message: request.message.clone(),
            sender_id: user_id,
            group_id,
            sent_at: to_rfc3339(sent_at),
        };
        let notification = json!({
            "group_id": group_id,
            "sender_id": user_id,
            "message": request.message,
        });

        let mut delivery = GroupDelivery::default();
        for member in self.store.group_member_ids(group_id).await? {
            if member == user_id {
                continue;
            }
            match self.registry.client_by_user_id(member).await {
                Some(client) => {
                    if client.send_event(EventType::ReceiveGroupMessage, &event) {
                        delivery.live += 1;
                    }
                }
                None => {
                    match self
                        .bridge
                        .create_and_push(
                            member,
                            NotificationKind::GroupMessage.as_str(),
                            notification.clone(),
                        )
                        .await
                    {
                        Ok(_) => delivery.notified += 1,
                        Err(e) => {
                            tracing::error!(user_id = %member, "failed to create notification: {}", e);
                        }
                    }
                }
            }
        }

        tracing::debug!(
            group_id = %group_id,
            live = delivery.live,
            notified = delivery.notified,
            "group message delivered"
        );
        Ok(delivery)
    }
}
