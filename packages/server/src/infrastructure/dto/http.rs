//! HTTP response bodies.

use serde::Serialize;

use crate::domain::UserId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
}

/// `GET /api/online`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineUsersDto {
    pub online_user_ids: Vec<UserId>,
}
