//! Infrastructure layer: wire formats and Store implementations.

pub mod dto;
pub mod store;
