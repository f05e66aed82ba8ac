//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, header};
use axum::response::Response;
use futures_util::StreamExt;

use super::session::Session;
use crate::app_state::AppState;
use crate::error::GatewayError;

/// Protocol-level message limit, far above the session frame ceiling.
///
/// Frames between the two limits reach the session, which answers with an
/// error envelope before closing. Only frames past this bound are cut off
/// by the transport without a reply.
const PROTOCOL_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// `GET /ws_users` (and `/ws`): check the origin, then upgrade.
///
/// # Errors
///
/// Returns [`GatewayError::OriginRejected`] (HTTP 403) before any session
/// is created if the `Origin` header is not allowed.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, GatewayError> {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    state.hub.origin_policy().check(origin)?;

    let hub = Arc::clone(&state.hub);
    let config = hub.session_config();
    let limit = PROTOCOL_MAX_MESSAGE_SIZE.max(config.max_message_size.saturating_mul(2));

    Ok(ws
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            Session::run(hub, sink, stream, config).await;
        }))
}
