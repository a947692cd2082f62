//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{domain::Store, realtime::Manager};

use super::{
    handler::{health_check, online_users, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// HTTP boundary of the real-time core
///
/// # Example
///
/// ```ignore
/// let manager = Manager::start(store.clone(), RealtimeConfig::default());
/// Server::new(manager, store).run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    manager: Arc<Manager>,
    store: Arc<dyn Store>,
}

impl Server {
    pub fn new(manager: Arc<Manager>, store: Arc<dyn Store>) -> Self {
        Self { manager, store }
    }

    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            manager: self.manager.clone(),
            store: self.store.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/online", get(online_users))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Bind to `host:port` and serve until Ctrl+C / SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Realtime server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves, then
    /// shut the real-time core down.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.manager.shutdown().await;
        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
