//! UseCase: ダイレクトメッセージ送信処理
//!
//! ## 処理の流れ（最初の失敗で停止）
//!
//! 1. ペイロードのデコード
//! 2. セッショントークンの再検証（接続中に失効したトークンを検出する）
//!    - 失敗した場合は 1008 で接続を閉じ、Registry から削除する
//! 3. フィールドのバリデーション（フィールドごとにエラーイベントを 1 件ずつ送る）
//! 4. 自分宛てメッセージの拒否
//! 5. 送信権限の確認（受信者が公開プロフィール、またはどちらかがフォローしている）
//! 6. 受信者の接続確認（オフラインなら送信者に RECEIVER_OFFLINE を通知し、保存は続行）
//! 7. 会話の検索または作成、メッセージの保存、会話の最終メッセージ時刻の更新
//! 8. 受信者（オンラインの場合）への配信と送信者へのエコー
//! 9. 受信者向けの通知を非同期に作成
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendDirectMessageUseCase::execute() メソッド
//!
//! ### どのような状況を想定しているか
//! - 正常系：両者オンラインで配信とエコーが同じ内容になる
//! - 正常系：受信者オフラインでもメッセージが保存される
//! - 異常系：251 文字のメッセージは Store に到達しない
//! - 異常系：自分宛て、送信権限なし、セッション失効、Store 障害

use std::sync::Arc;

use serde_json::json;
use tsunagi_shared::time::{Clock, to_rfc3339};

use crate::{
    domain::{MessageBody, NotificationKind, Store, UserId, Validator},
    infrastructure::dto::websocket::{
        ErrorCode, EventType, ReceiveMessagePayload, SendMessagePayload,
    },
    realtime::{Client, CloseReason, NotificationBridge, RealtimeError, Registry},
};

use super::{context, decode_payload};

/// ダイレクトメッセージ送信のユースケース
pub struct SendDirectMessageUseCase {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    bridge: Arc<NotificationBridge>,
    clock: Arc<dyn Clock>,
}

impl SendDirectMessageUseCase {
    /// 新しい SendDirectMessageUseCase を作成
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

    /// ダイレクトメッセージ送信を実行
    ///
    /// # Returns
    ///
    /// * `Ok(())` - 配信済み、または送信者にエラーイベントで通知済み
    /// * `Err(RealtimeError::InvalidSession)` - セッション失効により接続を閉じた
    /// * `Err(RealtimeError::Store(_))` - 永続化の失敗（接続は閉じられる）
    pub async fn execute(
        &self,
        sender: &Arc<Client>,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        let request: SendMessagePayload = decode_payload(payload)?;

        // 1. セッションの再検証
        let token = request
            .session_token
            .as_deref()
            .unwrap_or(sender.session_token());
        let user = match self.store.validate_session(token).await? {
            Some(user) if user.id == sender.user_id() => user,
            _ => {
                tracing::warn!(user_id = %sender.user_id(), "session re-validation failed");
                sender.close(CloseReason::POLICY_VIOLATION);
                self.registry.remove(sender).await;
                return Err(RealtimeError::InvalidSession);
            }
        };
        sender.mark_validated(self.clock.now());

        // 2. バリデーション
        let receiver_context = context("receiver_id", request.receiver_id);
        let mut v = Validator::new();
        let body = match MessageBody::new(request.message) {
            Ok(body) => Some(body),
            Err(e) => {
                v.check_field(false, "message", e.to_string());
                None
            }
        };
        let receiver_id = UserId::new(request.receiver_id);
        v.check_field(receiver_id.is_valid(), "receiver_id", "Invalid receiver ID");
        let body = match body {
            Some(body) if !v.has_errors() => body,
            _ => {
                for (field, message) in v.into_errors() {
                    sender.reject(
                        &RealtimeError::Validation { field, message },
                        receiver_context.clone(),
                    );
                }
                return Ok(());
            }
        };

        if receiver_id == user.id {
            sender.reject(
                &RealtimeError::Permission {
                    code: ErrorCode::SelfMessage,
                    message: "Cannot send messages to yourself".to_string(),
                },
                receiver_context,
            );
            return Ok(());
        }

        // 3. 送信権限
        if !self.store.can_message(user.id, receiver_id).await? {
            sender.reject(
                &RealtimeError::Permission {
                    code: ErrorCode::MessageNotAllowed,
                    message: "You cannot send messages to this user".to_string(),
                },
                receiver_context,
            );
            return Ok(());
        }

        // 4. 受信者の接続確認（オフラインでも保存は続行する）
        let receiver = self.registry.client_by_user_id(receiver_id).await;
        if receiver.is_none() {
            tracing::debug!(receiver_id = %receiver_id, "receiver is offline");
            sender.reject(
                &RealtimeError::NotFound {
                    code: ErrorCode::ReceiverOffline,
                    message: "Recipient is not online".to_string(),
                },
                receiver_context,
            );
        }

        // 5. 永続化
        let sent_at = self.clock.now();
        let conversation = match self.store.find_conversation(user.id, receiver_id).await? {
            Some(conversation) => conversation,
            None => {
                self.store
                    .create_conversation(user.id, receiver_id, sent_at)
                    .await?
            }
        };
        self.store
            .insert_message(conversation, user.id, body.as_str(), sent_at)
            .await?;
        self.store.touch_conversation(conversation, sent_at).await?;

        // 6. 配信とエコー
        let event = ReceiveMessagePayload {
            message: body.as_str().to_string(),
            sender_id: user.id,
            receiver_id,
            sent_at: to_rfc3339(sent_at),
        };
        if let Some(receiver) = receiver {
            receiver.send_event(EventType::ReceiveMessage, &event);
        }
        sender.send_event(EventType::ReceiveMessage, &event);

        // 7. 通知（オンラインかどうかに関係なく作成する）
        let bridge = self.bridge.clone();
        let notification = json!({
            "sender_id": user.id,
            "conversation_id": conversation,
            "message": body.into_string(),
        });
        tokio::spawn(async move {
            if let Err(e) = bridge
                .create_and_push(
                    receiver_id,
                    NotificationKind::DirectMessage.as_str(),
                    notification,
                )
                .await
            {
                tracing::error!(user_id = %receiver_id, "failed to create notification: {}", e);
            }
        });

        Ok(())
    }
}
