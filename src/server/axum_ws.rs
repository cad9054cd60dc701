//! Wires a [`super::ServerHub`] into an `axum` WebSocket upgrade route.
//!
//! Grounded in `services/server/src/ws_forwarder.rs::ws_forwarder_handler`
//! / `handle_forwarder_socket`'s upgrade-then-`tokio::select!`-loop shape,
//! minus the teacher's domain-specific heartbeat and command-channel
//! plumbing, which has no counterpart in this crate's surface.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use super::{run_connection, ServerHub};
use crate::transport::axum_adapter::AxumTransport;

/// Register as an axum route: `.route("/ws", get(axum_ws::upgrade)).with_state(hub)`.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<ServerHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_connection(AxumTransport(socket), hub).await {
            tracing::warn!(error = %e, "server: websocket session ended with an error");
        }
    })
}
