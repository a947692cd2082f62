//! Test doubles for the real-time core.

use std::{convert::Infallible, pin::Pin, sync::Arc};

use axum::extract::ws::Message;
use futures_util::{Sink, Stream, sink, stream};
use serde_json::Value;
use tokio::sync::mpsc;
use tsunagi_shared::time::{Clock, FixedClock};

use crate::{domain::UserId, infrastructure::dto::websocket::OutboundEnvelope};

use super::{
    client::{Client, ClientIdentity},
    registry::Registry,
};

pub type FakeStream = Pin<Box<dyn Stream<Item = Result<Message, Infallible>> + Send>>;
pub type FakeSink = Pin<Box<dyn Sink<Message, Error = Infallible> + Send>>;

pub fn identity(user: i64, name: &str) -> ClientIdentity {
    ClientIdentity {
        user_id: UserId::new(user),
        display_name: name.to_string(),
        session_token: format!("token-{user}"),
    }
}

/// Register a client without a transport; events are read from its egress.
pub async fn connect(
    registry: &Registry,
    user: i64,
    name: &str,
) -> (Arc<Client>, mpsc::Receiver<OutboundEnvelope>) {
    let (client, rx) = Client::new(identity(user, name), 16, FixedClock::from_millis(0).now());
    let client = Arc::new(client);
    registry.add(client.clone()).await;
    (client, rx)
}

/// The remote end of an in-process transport.
pub struct FakePeer {
    to_server: Option<mpsc::UnboundedSender<Result<Message, Infallible>>>,
    from_server: mpsc::UnboundedReceiver<Message>,
}

/// Build a connected sink/stream pair and the peer driving it.
pub fn transport() -> (FakeSink, FakeStream, FakePeer) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let stream: FakeStream = Box::pin(stream::unfold(inbound, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    let (outbound, from_server) = mpsc::unbounded_channel::<Message>();
    let sink: FakeSink = Box::pin(sink::unfold(
        outbound,
        |tx, message: Message| async move {
            // the peer may already be gone
            let _ = tx.send(message);
            Ok::<_, Infallible>(tx)
        },
    ));

    let peer = FakePeer {
        to_server: Some(to_server),
        from_server,
    };
    (sink, stream, peer)
}

impl FakePeer {
    pub fn send(&self, message: Message) {
        if let Some(tx) = &self.to_server {
            let _ = tx.send(Ok(message));
        }
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let text: String = text.into();
        self.send(Message::Text(text.into()));
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(value.to_string());
    }

    /// End the inbound stream, as a dropped TCP connection would.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }

    pub async fn next_frame(&mut self) -> Option<Message> {
        self.from_server.recv().await
    }

    /// Next text frame as JSON, skipping heartbeat pings.
    pub async fn next_event(&mut self) -> Value {
        loop {
            match self.next_frame().await {
                Some(Message::Text(text)) => {
                    return serde_json::from_str(text.as_str()).expect("server sent invalid JSON");
                }
                Some(Message::Ping(_)) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    /// Skip frames until the close frame and return its code.
    pub async fn close_code(&mut self) -> Option<u16> {
        while let Some(frame) = self.next_frame().await {
            if let Message::Close(frame) = frame {
                return frame.map(|f| f.code);
            }
        }
        None
    }
}
