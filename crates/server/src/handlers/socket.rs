//! WebSocket upgrade
//!
//! The client supplies its credential as the `token` query parameter at
//! connect time; verification happens inside the session before any
//! presence state exists.

use crate::config::AppState;
use crate::session;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    info!("GET /ws");
    ws.on_upgrade(move |socket| session::run(state, socket, params.token))
}
