//! Request handlers.

pub mod http;
pub mod websocket;

pub use http::{health_check, online_users};
pub use websocket::websocket_handler;
