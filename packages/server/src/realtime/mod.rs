//! The live core: connections, registry, dispatch and presence.

pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod notification;
pub mod presence;
pub mod registry;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Client, ClientIdentity, CloseReason};
pub use config::RealtimeConfig;
pub use error::RealtimeError;
pub use manager::{Manager, check_origin};
pub use notification::NotificationBridge;
pub use presence::{PresenceBroadcaster, PresenceTracker};
pub use registry::{OnlineUser, Registry};
pub use router::EventRouter;
