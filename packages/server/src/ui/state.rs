//! Shared application state.

use std::sync::Arc;

use crate::{domain::Store, realtime::Manager};

pub struct AppState {
    /// Manager（リアルタイム層の唯一の入り口）
    pub manager: Arc<Manager>,
    /// Store（セッションの初回検証に使用）
    pub store: Arc<dyn Store>,
}
