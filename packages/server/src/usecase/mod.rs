//! UseCase 層
//!
//! クライアントから届いたイベントごとのビジネスロジック。
//! 各ユースケースは Store と Registry に独立してアクセスし、
//! 前提条件を順番に検証して最初の失敗で処理を止める。

pub mod send_direct_message;
pub mod send_group_message;
pub mod send_typing;

pub use send_direct_message::SendDirectMessageUseCase;
pub use send_group_message::SendGroupMessageUseCase;
pub use send_typing::SendTypingUseCase;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::realtime::RealtimeError;

/// Decode a handler payload; a schema problem is reported by that handler only.
fn decode_payload<T: DeserializeOwned>(payload: Value) -> Result<T, RealtimeError> {
    serde_json::from_value(payload).map_err(|e| RealtimeError::Payload(e.to_string()))
}

/// Single-key context for error events.
fn context(key: &str, value: impl Into<Value>) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert(key.to_string(), value.into());
    context
}
