//! UI layer: the thin HTTP boundary in front of the real-time core.

pub mod handler;
pub mod server;
pub mod signal;
pub mod state;

pub use server::Server;
