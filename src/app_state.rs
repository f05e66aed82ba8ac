//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::UserService;
use crate::ws::ConnectionHub;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Request/response façade over the request actor.
    pub user_service: UserService,
    /// Live WebSocket sessions.
    pub hub: Arc<ConnectionHub>,
}
