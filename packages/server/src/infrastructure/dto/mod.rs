//! Data Transfer Objects (DTOs) for the real-time channel and the HTTP boundary.
//!
//! - `websocket`: envelope, event tags and per-event payloads
//! - `http`: HTTP response bodies
//! - `conversion`: domain entity → DTO conversions

pub mod conversion;
pub mod http;
pub mod websocket;
