//! The Manager composes the registry, the router, the presence ticker and
//! the notification bridge. It is the only entry point of the HTTP boundary.

use std::{fmt, sync::Arc};

use axum::{
    extract::ws::{Message, WebSocketUpgrade},
    http::{HeaderMap, header::ORIGIN},
    response::Response,
};
use futures_util::{Sink, Stream, StreamExt};
use tsunagi_shared::time::{Clock, SystemClock};

use crate::{
    domain::{Store, UserId},
    infrastructure::dto::websocket::{EventType, InboundEnvelope, UserStatusUpdate},
};

use super::{
    Client, ClientIdentity, EventRouter, NotificationBridge, PresenceBroadcaster,
    RealtimeConfig, RealtimeError, Registry,
};

/// リアルタイムコアの入口
///
/// ## 責務
///
/// - Origin の検証と WebSocket のアップグレード
/// - クライアントの登録、初回スナップショット送信、両ループの起動
/// - イベントのルーティングと Registry への問い合わせ
/// - プレゼンス配信の停止と全クライアントのクローズ（`shutdown`）
///
/// ## フィールド
///
/// - `config`: タイムアウト・フレーム上限などの設定
/// - `registry`: 接続中のクライアント
/// - `router`: イベント種別ごとのハンドラ
/// - `bridge`: 通知の作成とオンライン配信
/// - `presence`: 定期的なプレゼンス差分配信タスク
/// - `clock`: 時刻の取得元（テストでは固定）
pub struct Manager {
    config: RealtimeConfig,
    registry: Arc<Registry>,
    router: EventRouter,
    bridge: Arc<NotificationBridge>,
    presence: PresenceBroadcaster,
    clock: Arc<dyn Clock>,
}

impl Manager {
    /// Build the core and start the presence ticker. Must be called inside
    /// a tokio runtime.
    pub fn start(store: Arc<dyn Store>, config: RealtimeConfig) -> Arc<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        config: RealtimeConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let registry = Arc::new(Registry::new());
        let bridge = Arc::new(NotificationBridge::new(store.clone(), registry.clone()));
        let router = EventRouter::new(store, registry.clone(), bridge.clone(), clock.clone());
        let presence = PresenceBroadcaster::start(registry.clone(), config.presence_interval);

        Arc::new(Self {
            config,
            registry,
            router,
            bridge,
            presence,
            clock,
        })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationBridge {
        &self.bridge
    }

    /// Check the origin and hand the upgraded socket to [`Manager::accept`].
    pub fn upgrade_connection(
        self: &Arc<Self>,
        ws: WebSocketUpgrade,
        headers: &HeaderMap,
        identity: ClientIdentity,
    ) -> Result<Response, RealtimeError> {
        check_origin(headers, &self.config.allowed_origin)?;

        let manager = Arc::clone(self);
        Ok(ws
            .max_message_size(self.config.transport_limit())
            .max_frame_size(self.config.transport_limit())
            .on_upgrade(move |socket| async move {
                let (sink, stream) = socket.split();
                manager.accept(sink, stream, identity).await;
            }))
    }

    /// Register a client over an established transport, send it the current
    /// online snapshot and start both of its loops.
    pub async fn accept<K, S, E>(
        self: &Arc<Self>,
        sink: K,
        stream: S,
        identity: ClientIdentity,
    ) -> Arc<Client>
    where
        K: Sink<Message> + Unpin + Send + 'static,
        K::Error: fmt::Display + Send,
        S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (client, egress) =
            Client::new(identity, self.config.egress_capacity, self.clock.now());
        let client = Arc::new(client);
        self.registry.add(client.clone()).await;
        tracing::info!(
            user_id = %client.user_id(),
            connection_id = %client.id(),
            "client connected"
        );

        let online_users = self.registry.online_users_except(client.user_id()).await;
        if !online_users.is_empty() {
            let snapshot = UserStatusUpdate {
                online_users,
                offline_user_ids: Vec::new(),
            };
            client.send_event(EventType::UserStatusUpdate, &snapshot);
        }

        tokio::spawn(client.clone().write_pump(self.clone(), egress, sink));
        tokio::spawn(client.clone().read_pump(self.clone(), stream));
        client
    }

    /// Idempotent; safe to call from both loops of the same client.
    pub async fn remove_client(&self, client: &Client) {
        if self.registry.remove(client).await {
            tracing::info!(
                user_id = %client.user_id(),
                connection_id = %client.id(),
                "client disconnected"
            );
        }
    }

    pub async fn route_event(
        &self,
        envelope: InboundEnvelope,
        client: &Arc<Client>,
    ) -> Result<(), RealtimeError> {
        self.router.route(envelope, client).await
    }

    pub async fn online_user_ids(&self) -> Vec<UserId> {
        self.registry.online_user_ids().await
    }

    pub async fn client_by_user_id(&self, user: UserId) -> Option<Arc<Client>> {
        self.registry.client_by_user_id(user).await
    }

    /// Stop the presence ticker and close every client.
    pub async fn shutdown(&self) {
        self.presence.stop();
        let closed = self.registry.close_all().await;
        tracing::info!(clients = closed, "realtime manager shut down");
    }
}

/// The Origin header must exactly equal the configured value.
pub fn check_origin(headers: &HeaderMap, allowed: &str) -> Result<(), RealtimeError> {
    match headers.get(ORIGIN).map(|value| value.to_str()) {
        Some(Ok(origin)) if origin == allowed => Ok(()),
        Some(Ok(origin)) => Err(RealtimeError::Protocol(format!(
            "origin {origin} is not allowed"
        ))),
        Some(Err(_)) => Err(RealtimeError::Protocol("origin is not valid ASCII".to_string())),
        None => Err(RealtimeError::Protocol("missing origin header".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{GroupId, User},
        infrastructure::store::InMemoryStore,
        realtime::{
            CloseReason,
            testing::{FakePeer, identity, transport},
        },
    };
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;
    use tsunagi_shared::time::FixedClock;

    // ========================================
    // テストヘルパー
    // ========================================

    fn test_config() -> RealtimeConfig {
        RealtimeConfig {
            presence_interval: Duration::from_secs(3600),
            ..RealtimeConfig::default()
        }
    }

    async fn create_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(FixedClock::from_millis(0))));
        store.add_user(User::new(UserId::new(1), "alice", true)).await;
        store.add_user(User::new(UserId::new(2), "bob", true)).await;
        store.open_session("token-1", UserId::new(1)).await;
        store.open_session("token-2", UserId::new(2)).await;
        store
    }

    async fn create_manager(store: Arc<InMemoryStore>, config: RealtimeConfig) -> Arc<Manager> {
        Manager::with_clock(store, config, Arc::new(FixedClock::from_millis(0)))
    }

    async fn join(manager: &Arc<Manager>, user: i64, name: &str) -> (Arc<Client>, FakePeer) {
        let (sink, stream, peer) = transport();
        let client = manager.accept(sink, stream, identity(user, name)).await;
        (client, peer)
    }

    async fn wait_for_removal(manager: &Manager, client: &Client) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while manager.registry.contains(client).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client was not removed");
    }

    // ========================================
    // check_origin
    // ========================================

    #[test]
    fn test_check_origin_requires_exact_match() {
        // テスト項目: Origin ヘッダーが設定値と完全一致する場合のみ許可される
        // given (前提条件):
        let allowed = "http://localhost:8080";
        let mut exact = HeaderMap::new();
        exact.insert(ORIGIN, HeaderValue::from_static("http://localhost:8080"));
        let mut other = HeaderMap::new();
        other.insert(ORIGIN, HeaderValue::from_static("http://localhost:8080.evil.test"));

        // when (操作) / then (期待する結果):
        assert!(check_origin(&exact, allowed).is_ok());
        assert!(matches!(
            check_origin(&other, allowed),
            Err(RealtimeError::Protocol(_))
        ));
        assert!(matches!(
            check_origin(&HeaderMap::new(), allowed),
            Err(RealtimeError::Protocol(_))
        ));
    }

    // ========================================
    // 接続とスナップショット
    // ========================================

    #[tokio::test]
    async fn test_initial_snapshot_lists_others_only() {
        // テスト項目: C1 の後に C2 が接続すると、C2 の初期スナップショットには C1 のみが含まれる
        // given (前提条件):
        let manager = create_manager(create_store().await, test_config()).await;
        let (_c1, mut peer1) = join(&manager, 1, "alice").await;

        // when (操作):
        let (_c2, mut peer2) = join(&manager, 2, "bob").await;

        // then (期待する結果):
        let snapshot = peer2.next_event().await;
        assert_eq!(
            snapshot,
            json!({
                "type": "user_status_update",
                "payload": {
                    "online_users": [{"id": 1, "display_name": "alice", "status": 1}],
                    "offline_user_ids": []
                }
            })
        );
        // C1 は空のスナップショットを受け取らないため、最初のイベントは new_typing になる
        peer2.send_json(json!({"type": "send_typing", "payload": {"receiver_id": 1, "is_typing": true}}));
        let first_for_c1 = peer1.next_event().await;
        assert_eq!(first_for_c1["type"], json!("new_typing"));
        assert_eq!(manager.online_user_ids().await, vec![UserId::new(1), UserId::new(2)]);
    }

    #[tokio::test]
    async fn test_direct_message_through_transport() {
        // テスト項目: トランスポート経由で送ったメッセージが受信者と送信者に届く
        // given (前提条件):
        let store = create_store().await;
        let manager = create_manager(store.clone(), test_config()).await;
        let (_alice, mut alice_peer) = join(&manager, 1, "alice").await;
        let (_bob, mut bob_peer) = join(&manager, 2, "bob").await;
        let _snapshot = bob_peer.next_event().await;

        // when (操作):
        alice_peer.send_json(json!({
            "type": "send_message",
            "payload": {"message": "hi bob", "receiver_id": 2}
        }));

        // then (期待する結果):
        let received = bob_peer.next_event().await;
        let echoed = alice_peer.next_event().await;
        assert_eq!(received["type"], json!("receive_message"));
        assert_eq!(received, echoed);
        assert_eq!(received["payload"]["message"], json!("hi bob"));
        assert_eq!(store.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_notification_reaches_live_client() {
        // テスト項目: Manager 経由で作成した通知がオンラインのクライアントに届く
        // given (前提条件):
        let store = create_store().await;
        let manager = create_manager(store.clone(), test_config()).await;
        let (_bob, mut bob_peer) = join(&manager, 2, "bob").await;

        // when (操作):
        let created = manager
            .notifications()
            .create_and_push(UserId::new(2), "group_message", json!({"group_id": 1}))
            .await
            .unwrap();

        // then (期待する結果):
        let event = bob_peer.next_event().await;
        assert_eq!(event["type"], json!("notification"));
        assert_eq!(event["payload"]["id"], json!(created.id));
        assert_eq!(event["payload"]["is_read"], json!(false));
        assert_eq!(store.notifications_for(UserId::new(2)).await.unwrap().len(), 1);
    }

    // ========================================
    // 切断
    // ========================================

    #[tokio::test]
    async fn test_oversized_frame_closes_with_1009() {
        // テスト項目: 上限を超えるフレームは致命的なデコードエラーとして 1009 で切断される
        // given (前提条件):
        let config = RealtimeConfig {
            max_frame_size: 64,
            ..test_config()
        };
        let manager = create_manager(create_store().await, config).await;
        let (alice, mut peer) = join(&manager, 1, "alice").await;

        // when (操作):
        peer.send_json(json!({
            "type": "send_typing",
            "payload": {"receiver_id": 2, "is_typing": true, "padding": "x".repeat(100)}
        }));

        // then (期待する結果):
        assert_eq!(peer.close_code().await, Some(1009));
        wait_for_removal(&manager, &alice).await;
        assert_eq!(alice.close_reason(), Some(CloseReason::MESSAGE_TOO_BIG));
    }

    #[tokio::test]
    async fn test_malformed_envelope_closes_with_1007() {
        // テスト項目: JSON として解釈できないエンベロープは 1007 で切断される
        // given (前提条件):
        let manager = create_manager(create_store().await, test_config()).await;
        let (alice, mut peer) = join(&manager, 1, "alice").await;

        // when (操作):
        peer.send_text("{not json");

        // then (期待する結果):
        assert_eq!(peer.close_code().await, Some(1007));
        wait_for_removal(&manager, &alice).await;
    }

    #[tokio::test]
    async fn test_handler_errors_keep_connection_open() {
        // テスト項目: 未対応のイベントやペイロードエラーでは接続が維持される
        // given (前提条件):
        let manager = create_manager(create_store().await, test_config()).await;
        let (alice, mut alice_peer) = join(&manager, 1, "alice").await;

        // when (操作):
        alice_peer.send_json(json!({"type": "change_room", "payload": {}}));
        alice_peer.send_json(json!({"type": "send_typing", "payload": {"receiver_id": "x"}}));
        alice_peer.send_json(json!({"type": "send_typing", "payload": {"receiver_id": 1, "is_typing": true}}));

        // then (期待する結果):
        let error = alice_peer.next_event().await;
        assert_eq!(error["payload"]["code"], json!("SELF_TYPING"));
        assert!(!alice.is_closed());
        assert!(manager.client_by_user_id(UserId::new(1)).await.is_some());
    }

    #[tokio::test]
    async fn test_revoked_session_closes_with_1008() {
        // テスト項目: 接続中にセッションが失効すると次のメッセージ送信で 1008 で切断される
        // given (前提条件):
        let store = create_store().await;
        let manager = create_manager(store.clone(), test_config()).await;
        let (alice, mut peer) = join(&manager, 1, "alice").await;
        store.revoke_session("token-1").await;

        // when (操作):
        peer.send_json(json!({"type": "send_message", "payload": {"message": "hi", "receiver_id": 2}}));

        // then (期待する結果):
        assert_eq!(peer.close_code().await, Some(1008));
        wait_for_removal(&manager, &alice).await;
    }

    #[tokio::test]
    async fn test_store_failure_tears_connection_down() {
        // テスト項目: Store の障害は接続を切断する
        // given (前提条件):
        let store = create_store().await;
        store.add_group_member(GroupId::new(5), UserId::new(1)).await;
        let manager = create_manager(store.clone(), test_config()).await;
        let (alice, mut peer) = join(&manager, 1, "alice").await;
        store.set_failing(true);

        // when (操作):
        peer.send_json(json!({"type": "send_group_message", "payload": {"message": "hi", "group_id": 5}}));

        // then (期待する結果):
        assert_eq!(peer.close_code().await, Some(1011));
        wait_for_removal(&manager, &alice).await;
    }

    #[tokio::test]
    async fn test_hang_up_removes_client_once() {
        // テスト項目: 相手が切断すると両方のループが終了し、Registry から 1 回だけ削除される
        // given (前提条件):
        let manager = create_manager(create_store().await, test_config()).await;
        let (alice, mut peer) = join(&manager, 1, "alice").await;
        let (_bob, _bob_peer) = join(&manager, 2, "bob").await;

        // when (操作):
        peer.hang_up();

        // then (期待する結果):
        wait_for_removal(&manager, &alice).await;
        assert_eq!(peer.close_code().await, Some(1000));
        assert_eq!(manager.online_user_ids().await, vec![UserId::new(2)]);
        // 2 回目の削除は何もしない
        manager.remove_client(&alice).await;
        assert_eq!(manager.registry.len().await, 1);
    }

    // ========================================
    // ハートビート
    // ========================================

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        // テスト項目: ping に応答しない相手は読み込み期限（10 秒）で切断される
        // given (前提条件):
        let manager = create_manager(create_store().await, test_config()).await;
        let started = Instant::now();
        let (alice, mut peer) = join(&manager, 1, "alice").await;

        // when (操作):
        let first = peer.next_frame().await;

        // then (期待する結果):
        assert!(matches!(first, Some(Message::Ping(_))));
        assert_eq!(started.elapsed(), Duration::from_secs(9));
        assert_eq!(peer.close_code().await, Some(1000));
        assert!(started.elapsed() >= Duration::from_secs(10));
        wait_for_removal(&manager, &alice).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_keep_connection_alive() {
        // テスト項目: pong を返し続ける相手は読み込み期限を超えても接続が維持される
        // given (前提条件):
        let manager = create_manager(create_store().await, test_config()).await;
        let started = Instant::now();
        let (alice, mut peer) = join(&manager, 1, "alice").await;

        // when (操作):
        for _ in 0..4 {
            let frame = peer.next_frame().await;
            assert!(matches!(frame, Some(Message::Ping(_))));
            peer.send(Message::Pong(Vec::new().into()));
        }

        // then (期待する結果):
        assert!(started.elapsed() >= Duration::from_secs(36));
        assert!(!alice.is_closed());
        assert!(manager.client_by_user_id(UserId::new(1)).await.is_some());
    }

    // ========================================
    // シャットダウン
    // ========================================

    #[tokio::test]
    async fn test_shutdown_closes_every_client() {
        // テスト項目: shutdown で全クライアントに正常終了のクローズフレームが送られる
        // given (前提条件):
        let manager = create_manager(create_store().await, test_config()).await;
        let (alice, mut alice_peer) = join(&manager, 1, "alice").await;
        let (bob, mut bob_peer) = join(&manager, 2, "bob").await;

        // when (操作):
        manager.shutdown().await;

        // then (期待する結果):
        assert_eq!(alice_peer.close_code().await, Some(1000));
        assert_eq!(bob_peer.close_code().await, Some(1000));
        wait_for_removal(&manager, &alice).await;
        wait_for_removal(&manager, &bob).await;
        assert!(manager.online_user_ids().await.is_empty());
    }
}
