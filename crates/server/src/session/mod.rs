//! Connection sessions
//!
//! One session per live WebSocket. A session moves through
//! `Connecting -> Authenticated -> Closed`; joined rooms are tracked by
//! the router while the session is authenticated. Outbound delivery
//! goes through a per-session queue so broadcast fan-out never blocks
//! on a slow socket.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::IdentityVerifier;
use crate::config::AppState;
use crate::models::UserInfo;
use crate::protocol::{ClientEvent, ServerEvent};

pub type SessionId = Uuid;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Authenticated,
    Closed,
}

/// Handle to a live session: identity plus the outbound event queue.
/// Cloneable; everything that fans out events holds these.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub user: UserInfo,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl SessionHandle {
    pub fn new(user: UserInfo) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session_id: Uuid::new_v4(),
                user,
                tx,
            },
            rx,
        )
    }

    /// Queue an event for delivery. Returns false if the session is
    /// gone; the caller logs and moves on, it never retries.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Drive one WebSocket connection through its whole lifecycle.
///
/// The credential is verified before any registry state is created; an
/// invalid credential gets a single `error` frame and the socket is
/// closed with nothing to clean up.
pub async fn run(state: AppState, socket: WebSocket, credential: Option<String>) {
    let mut session_state = SessionState::Connecting;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let user = match authenticate(&state, credential.as_deref()).await {
        Ok(user) => user,
        Err(message) => {
            debug!("Rejected connection in state {:?}: {}", session_state, message);
            let frame = serde_json::to_string(&ServerEvent::Error { message }).unwrap_or_default();
            let _ = ws_tx.send(WsMessage::Text(frame.into())).await;
            return;
        }
    };

    session_state = SessionState::Authenticated;

    let (handle, mut rx) = SessionHandle::new(user);
    state.router.connect(handle.clone()).await;

    info!(
        "Session {} opened for {}",
        handle.session_id, handle.user.username
    );

    let grace = state.config.liveness_grace;
    let mut deadline = Instant::now() + grace;

    while session_state == SessionState::Authenticated {
        tokio::select! {
            // No inbound traffic within the grace period: treat as
            // disconnected so presence cannot go stale.
            _ = tokio::time::sleep_until(deadline) => {
                info!("Session {} timed out", handle.session_id);
                session_state = SessionState::Closed;
            }

            outbound = rx.recv() => {
                match outbound {
                    Some(event) => {
                        let frame = match serde_json::to_string(&event) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("Failed to encode event for {}: {}", handle.session_id, e);
                                continue;
                            }
                        };
                        if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                            session_state = SessionState::Closed;
                        }
                    }
                    None => session_state = SessionState::Closed,
                }
            }

            inbound = ws_rx.next() => {
                deadline = Instant::now() + grace;
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        dispatch(&state, &handle, text.as_str()).await;
                    }
                    // Pings and pongs only refresh liveness
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Binary(_))) => {
                        handle.send(ServerEvent::Error {
                            message: "binary frames are not supported".to_string(),
                        });
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                        session_state = SessionState::Closed;
                    }
                }
            }
        }
    }

    state.router.handle_disconnect(&handle).await;

    info!(
        "Session {} closed for {}",
        handle.session_id, handle.user.username
    );
}

async fn authenticate(
    state: &AppState,
    credential: Option<&str>,
) -> Result<UserInfo, String> {
    let credential = credential.ok_or_else(|| "missing credential".to_string())?;
    state
        .auth
        .verify(credential)
        .await
        .map_err(|e| e.to_string())
}

async fn dispatch(state: &AppState, handle: &SessionHandle, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!("Malformed frame from {}: {}", handle.session_id, e);
            handle.send(ServerEvent::Error {
                message: "malformed event".to_string(),
            });
            return;
        }
    };

    match event {
        ClientEvent::Join { conversation_id } => {
            state.router.handle_join(handle, &conversation_id).await;
        }
        ClientEvent::Send {
            conversation_id,
            text,
        } => {
            state.router.handle_send(handle, &conversation_id, &text).await;
        }
        ClientEvent::Typing {
            conversation_id,
            is_typing,
        } => {
            state
                .router
                .handle_typing(handle, &conversation_id, is_typing)
                .await;
        }
    }
}
