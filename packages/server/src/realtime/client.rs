//! One live connection and its two loops.
//!
//! The read pump is the only task reading from the transport and the write
//! pump is the only task writing to it. They share the bounded egress queue
//! and a close signal; whichever loop stops first records a close reason,
//! which wakes the other one, and both end in `Manager::remove_client`.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    time::{Instant, interval_at, timeout_at},
};

use crate::{
    domain::{ConnectionId, PresenceStatus, UserId},
    infrastructure::dto::websocket::{
        ErrorCode, ErrorEventPayload, EventType, InboundEnvelope, OutboundEnvelope, UserStatusInfo,
    },
};

use super::{Manager, RealtimeError};

/// Close code and reason written in the final close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

impl CloseReason {
    pub const NORMAL: Self = Self {
        code: 1000,
        reason: "Normal closure",
    };
    pub const INVALID_PAYLOAD: Self = Self {
        code: 1007,
        reason: "Malformed envelope",
    };
    pub const POLICY_VIOLATION: Self = Self {
        code: 1008,
        reason: "Invalid session token",
    };
    pub const MESSAGE_TOO_BIG: Self = Self {
        code: 1009,
        reason: "Frame too large",
    };
    pub const INTERNAL_ERROR: Self = Self {
        code: 1011,
        reason: "Internal server error",
    };
}

/// Who is on the other end, as established by the HTTP boundary.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_id: UserId,
    pub display_name: String,
    pub session_token: String,
}

/// 1 本の WebSocket 接続
///
/// ## 責務
///
/// - 送信キュー（egress）への非ブロッキングな enqueue（満杯なら破棄）
/// - クローズ理由の記録（最初の理由が優先）
/// - `read_pump` / `write_pump` による受信・送信ループ
///
/// ## フィールド
///
/// - `id`: 接続 ID（同一ユーザーの複数接続を区別する）
/// - `user_id` / `display_name` / `session_token`: 接続時に確定した利用者情報
/// - `last_validated_ms`: 最後にセッションを再検証した時刻（Unix ミリ秒）
/// - `egress`: 有界の送信キュー。読み出すのは `write_pump` のみ
/// - `shutdown`: クローズ理由。両ループがこれを監視する
pub struct Client {
    id: ConnectionId,
    user_id: UserId,
    display_name: String,
    session_token: String,
    last_validated_ms: AtomicI64,
    egress: mpsc::Sender<OutboundEnvelope>,
    shutdown: watch::Sender<Option<CloseReason>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client and the receiving half of its egress queue.
    pub fn new(
        identity: ClientIdentity,
        egress_capacity: usize,
        validated_at: DateTime<Utc>,
    ) -> (Self, mpsc::Receiver<OutboundEnvelope>) {
        let (egress, rx) = mpsc::channel(egress_capacity.max(1));
        let (shutdown, _) = watch::channel(None);
        let client = Self {
            id: ConnectionId::generate(),
            user_id: identity.user_id,
            display_name: identity.display_name,
            session_token: identity.session_token,
            last_validated_ms: AtomicI64::new(validated_at.timestamp_millis()),
            egress,
            shutdown,
        };
        (client, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn last_validated(&self) -> Option<DateTime<Utc>> {
        tsunagi_shared::time::from_millis(self.last_validated_ms.load(Ordering::Relaxed))
    }

    pub fn mark_validated(&self, at: DateTime<Utc>) {
        self.last_validated_ms
            .store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn status_info(&self) -> UserStatusInfo {
        UserStatusInfo {
            id: self.user_id,
            display_name: self.display_name.clone(),
            status: PresenceStatus::Online,
        }
    }

    // ========================================
    // Egress
    // ========================================

    /// Non-blocking enqueue. A full or closed queue drops the envelope.
    pub fn enqueue(&self, envelope: OutboundEnvelope) -> bool {
        match self.egress.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(envelope)) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    connection_id = %self.id,
                    event_type = envelope.event_type.tag(),
                    "egress full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(envelope)) => {
                tracing::debug!(
                    user_id = %self.user_id,
                    connection_id = %self.id,
                    event_type = envelope.event_type.tag(),
                    "egress closed, dropping event"
                );
                false
            }
        }
    }

    pub fn send_event<T: Serialize>(&self, event_type: EventType, payload: &T) -> bool {
        match OutboundEnvelope::new(event_type, payload) {
            Ok(envelope) => self.enqueue(envelope),
            Err(e) => {
                tracing::error!(
                    user_id = %self.user_id,
                    event_type = event_type.tag(),
                    "failed to encode event: {}",
                    e
                );
                false
            }
        }
    }

    /// Best-effort structured error to this client only.
    pub fn send_error(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        context: Map<String, Value>,
    ) -> bool {
        let payload = ErrorEventPayload {
            code,
            message: message.into(),
            context,
        };
        self.send_event(EventType::Error, &payload)
    }

    /// Report a recoverable rejection to the sender. Returns false for
    /// errors that are not reported on the wire.
    pub fn reject(&self, error: &RealtimeError, mut context: Map<String, Value>) -> bool {
        let Some(code) = error.code() else {
            return false;
        };
        if let RealtimeError::Validation { field, .. } = error {
            context.insert("field".to_string(), Value::from(*field));
        }
        self.send_error(code, error.to_string(), context)
    }

    // ========================================
    // Close signal
    // ========================================

    /// Record a close reason. The first reason wins; returns whether this
    /// call was the one that recorded it.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.shutdown.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.shutdown.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason().is_some()
    }

    /// Resolves once a close reason has been recorded.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.shutdown.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        };
        reason.unwrap_or(CloseReason::NORMAL)
    }

    // ========================================
    // Loops
    // ========================================

    /// Decode loop: framed reads under a rolling deadline, routed one at a
    /// time in arrival order.
    pub async fn read_pump<S, E>(self: Arc<Self>, manager: Arc<Manager>, mut stream: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        let pong_wait = manager.config().pong_wait;
        let max_frame_size = manager.config().max_frame_size;
        let mut deadline = Instant::now() + pong_wait;

        let closed = self.closed();
        tokio::pin!(closed);

        loop {
            let frame = tokio::select! {
                _ = &mut closed => break,
                frame = timeout_at(deadline, stream.next()) => frame,
            };

            let message = match frame {
                Err(_) => {
                    tracing::info!(
                        user_id = %self.user_id,
                        connection_id = %self.id,
                        "read deadline exceeded"
                    );
                    break;
                }
                Ok(None) => {
                    tracing::info!(user_id = %self.user_id, "stream ended");
                    break;
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(user_id = %self.user_id, error = %e, "websocket receive error");
                    break;
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    let envelope = match decode_envelope(text.as_str(), max_frame_size) {
                        Ok(envelope) => envelope,
                        Err((error, reason)) => {
                            tracing::warn!(user_id = %self.user_id, "{}", error);
                            self.close(reason);
                            break;
                        }
                    };
                    tracing::debug!(
                        user_id = %self.user_id,
                        event_type = %envelope.event_type,
                        "received event"
                    );
                    match manager.route_event(envelope, &self).await {
                        Ok(()) => {}
                        Err(error) if error.is_fatal() => {
                            tracing::warn!(user_id = %self.user_id, "closing connection: {}", error);
                            if matches!(error, RealtimeError::Store(_)) {
                                self.close(CloseReason::INTERNAL_ERROR);
                            }
                            break;
                        }
                        Err(error) => {
                            tracing::warn!(user_id = %self.user_id, "error handling event: {}", error);
                        }
                    }
                }
                Message::Binary(_) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        "{}",
                        RealtimeError::Decode("binary frames are not supported".to_string())
                    );
                    self.close(CloseReason::INVALID_PAYLOAD);
                    break;
                }
                Message::Pong(_) => {
                    tracing::trace!(user_id = %self.user_id, "pong");
                    deadline = Instant::now() + pong_wait;
                }
                Message::Ping(_) => {
                    tracing::trace!(user_id = %self.user_id, "ping");
                }
                Message::Close(frame) => {
                    tracing::info!(user_id = %self.user_id, reason = ?frame, "client initiated close");
                    break;
                }
            }
        }

        manager.remove_client(&self).await;
    }

    /// Send loop: the only writer of the transport.
    pub async fn write_pump<K>(
        self: Arc<Self>,
        manager: Arc<Manager>,
        mut egress: mpsc::Receiver<OutboundEnvelope>,
        mut sink: K,
    ) where
        K: Sink<Message> + Unpin,
        K::Error: fmt::Display,
    {
        let ping_interval = manager.config().ping_interval();
        let mut heartbeat = interval_at(Instant::now() + ping_interval, ping_interval);

        let closed = self.closed();
        tokio::pin!(closed);

        loop {
            tokio::select! {
                reason = &mut closed => {
                    egress.close();
                    // flush what was accepted before the close
                    while let Ok(envelope) = egress.try_recv() {
                        if write_envelope(&mut sink, &envelope).await.is_err() {
                            break;
                        }
                    }
                    let frame = CloseFrame {
                        code: reason.code,
                        reason: reason.reason.into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!(user_id = %self.user_id, "failed to write close frame: {}", e);
                    }
                    break;
                }
                envelope = egress.recv() => {
                    let Some(envelope) = envelope else {
                        break;
                    };
                    if let Err(e) = write_envelope(&mut sink, &envelope).await {
                        tracing::warn!(user_id = %self.user_id, "failed to send message: {}", e);
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    tracing::trace!(user_id = %self.user_id, "ping");
                    if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                        tracing::warn!(user_id = %self.user_id, "failed to send ping: {}", e);
                        break;
                    }
                }
            }
        }

        manager.remove_client(&self).await;
    }
}

fn decode_envelope(
    text: &str,
    max_frame_size: usize,
) -> Result<InboundEnvelope, (RealtimeError, CloseReason)> {
    if text.len() > max_frame_size {
        return Err((
            RealtimeError::Decode(format!(
                "frame of {} bytes exceeds the limit of {}",
                text.len(),
                max_frame_size
            )),
            CloseReason::MESSAGE_TOO_BIG,
        ));
    }
    serde_json::from_str(text).map_err(|e| {
        (
            RealtimeError::Decode(format!("malformed envelope: {e}")),
            CloseReason::INVALID_PAYLOAD,
        )
    })
}

async fn write_envelope<K>(sink: &mut K, envelope: &OutboundEnvelope) -> Result<(), String>
where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    let text = serde_json::to_string(envelope).map_err(|e| e.to_string())?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tsunagi_shared::time::{Clock, FixedClock};

    fn identity(id: i64) -> ClientIdentity {
        ClientIdentity {
            user_id: UserId::new(id),
            display_name: format!("user{id}"),
            session_token: format!("token-{id}"),
        }
    }

    fn new_client(capacity: usize) -> (Client, mpsc::Receiver<OutboundEnvelope>) {
        Client::new(identity(1), capacity, FixedClock::from_millis(1_000).now())
    }

    #[test]
    fn test_first_close_reason_wins() {
        // テスト項目: 最初に記録されたクローズ理由が保持される
        // given (前提条件):
        let (client, _rx) = new_client(4);

        // when (操作):
        let first = client.close(CloseReason::POLICY_VIOLATION);
        let second = client.close(CloseReason::NORMAL);

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(client.close_reason(), Some(CloseReason::POLICY_VIOLATION));
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        // テスト項目: closed() はクローズ後に理由を返す
        // given (前提条件):
        let client = Arc::new(new_client(4).0);
        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.closed().await })
        };

        // when (操作):
        client.close(CloseReason::MESSAGE_TOO_BIG);

        // then (期待する結果):
        assert_eq!(waiter.await.unwrap(), CloseReason::MESSAGE_TOO_BIG);
    }

    #[test]
    fn test_enqueue_drops_when_full() {
        // テスト項目: 送信キューが満杯の場合はブロックせずに破棄する
        // given (前提条件):
        let (client, mut rx) = new_client(1);
        let envelope = OutboundEnvelope::new(EventType::NewTyping, &json!({})).unwrap();

        // when (操作):
        let first = client.enqueue(envelope.clone());
        let second = client.enqueue(envelope);

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reject_validation_adds_field_context() {
        // テスト項目: バリデーションエラーは field コンテキスト付きのエラーイベントになる
        // given (前提条件):
        let (client, mut rx) = new_client(4);
        let error = RealtimeError::Validation {
            field: "message",
            message: "Message cannot be empty".to_string(),
        };
        let mut context = Map::new();
        context.insert("receiver_id".to_string(), json!(2));

        // when (操作):
        let sent = client.reject(&error, context);

        // then (期待する結果):
        assert!(sent);
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.event_type, EventType::Error);
        assert_eq!(
            envelope.payload,
            json!({
                "code": "VALIDATION_ERROR",
                "message": "Message cannot be empty",
                "field": "message",
                "receiver_id": 2
            })
        );
    }

    #[test]
    fn test_reject_ignores_unreported_errors() {
        // テスト項目: 送信者に通知しないエラーはキューに積まれない
        // given (前提条件):
        let (client, mut rx) = new_client(4);

        // when (操作):
        let sent = client.reject(&RealtimeError::Payload("bad".to_string()), Map::new());

        // then (期待する結果):
        assert!(!sent);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_decode_envelope_limits() {
        // テスト項目: 上限超過フレームは 1009、不正な JSON は 1007 で切断理由になる
        // given (前提条件):
        let oversized = format!(r#"{{"type":"send_typing","payload":"{}"}}"#, "a".repeat(64));

        // when (操作):
        let too_big = decode_envelope(&oversized, 32);
        let malformed = decode_envelope("not json", 32);
        let ok = decode_envelope(r#"{"type":"send_typing"}"#, 32);

        // then (期待する結果):
        assert!(matches!(
            too_big,
            Err((RealtimeError::Decode(_), CloseReason::MESSAGE_TOO_BIG))
        ));
        assert!(matches!(
            malformed,
            Err((RealtimeError::Decode(_), CloseReason::INVALID_PAYLOAD))
        ));
        assert_eq!(ok.unwrap().payload, Value::Null);
    }

    #[test]
    fn test_mark_validated_updates_timestamp() {
        // テスト項目: セッション再検証時刻が更新される
        // given (前提条件):
        let (client, _rx) = new_client(4);
        let later = FixedClock::from_millis(9_000).now();

        // when (操作):
        client.mark_validated(later);

        // then (期待する結果):
        assert_eq!(client.last_validated(), Some(later));
    }
}
