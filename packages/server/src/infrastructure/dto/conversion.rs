//! Conversion logic between domain entities and DTOs.

use tsunagi_shared::time::to_rfc3339;

use crate::domain::Notification;
use crate::infrastructure::dto::websocket as dto;

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&Notification> for dto::NotificationEventPayload {
    fn from(model: &Notification) -> Self {
        Self {
            id: model.id,
            kind: model.kind.clone(),
            payload: model.payload.clone(),
            is_read: model.is_read,
            created_at: to_rfc3339(model.created_at),
        }
    }
}
