//! Error taxonomy of the real-time core.

use thiserror::Error;

use crate::{domain::StoreError, infrastructure::dto::websocket::ErrorCode};

#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Handshake rejected (origin not allowed).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed envelope or oversized frame.
    #[error("decode error: {0}")]
    Decode(String),

    /// A handler could not decode its own payload.
    #[error("bad payload in request: {0}")]
    Payload(String),

    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{message}")]
    Permission { code: ErrorCode, message: String },

    #[error("{message}")]
    NotFound { code: ErrorCode, message: String },

    /// Session token unknown, revoked, or bound to another user.
    #[error("invalid session token")]
    InvalidSession,

    #[error("this event type is not supported: {0}")]
    UnsupportedEvent(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Fatal errors tear the connection down; everything else is reported
    /// or logged and the connection stays open.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Decode(_) | Self::InvalidSession | Self::Store(_)
        )
    }

    /// Code carried by the `error` event for rejections reported to the sender.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Validation { .. } => Some(ErrorCode::ValidationError),
            Self::Permission { code, .. } | Self::NotFound { code, .. } => Some(*code),
            _ => None,
        }
    }
}
