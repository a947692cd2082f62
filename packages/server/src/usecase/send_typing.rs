//! UseCase: 入力中インジケーター
//!
//! 受信者がオンラインの場合のみ転送する。オフラインの場合は何もしない
//! （エラーも通知も保存もしない）。

use std::sync::Arc;

use crate::{
    domain::UserId,
    infrastructure::dto::websocket::{ErrorCode, EventType, NewTypingPayload, SendTypingPayload},
    realtime::{Client, RealtimeError, Registry},
};

use super::{context, decode_payload};

pub struct SendTypingUseCase {
    registry: Arc<Registry>,
}

impl SendTypingUseCase {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Returns whether the flag was forwarded.
    pub async fn execute(
        &self,
        sender: &Arc<Client>,
        payload: serde_json::Value,
    ) -> Result<bool, RealtimeError> {
        let request: SendTypingPayload = decode_payload(payload)?;
        let receiver_id = UserId::new(request.receiver_id);

        if receiver_id == sender.user_id() {
            sender.reject(
                &RealtimeError::Permission {
                    code: ErrorCode::SelfTyping,
                    message: "Cannot send typing status to yourself".to_string(),
                },
                context("receiver_id", request.receiver_id),
            );
            return Ok(false);
        }

        let Some(receiver) = self.registry.client_by_user_id(receiver_id).await else {
            return Ok(false);
        };
        let event = NewTypingPayload {
            sender_id: sender.user_id(),
            receiver_id,
            is_typing: request.is_typing,
        };
        Ok(receiver.send_event(EventType::NewTyping, &event))
    }
}
