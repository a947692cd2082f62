//! Domain layer: value objects, entities and the persistence contract.

pub mod entity;
pub mod error;
pub mod store;
pub mod validator;
pub mod value_object;

pub use entity::{Notification, NotificationKind, PresenceStatus, User};
pub use error::StoreError;
pub use store::Store;
#[cfg(test)]
pub use store::MockStore;
pub use validator::Validator;
pub use value_object::{
    ConnectionId, ConversationId, GroupId, MessageBody, MessageBodyError, MessageId,
    NotificationId, UserId,
};
