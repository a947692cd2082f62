//! Real-time presence and messaging core.
//!
//! Accepts authenticated WebSocket connections, tracks who is online, routes
//! typed events (direct messages, group messages, typing indicators) between
//! connections and bridges to a durable notification store for offline delivery.

// layers
pub mod domain;
pub mod infrastructure;
pub mod realtime;
pub mod ui;
pub mod usecase;
