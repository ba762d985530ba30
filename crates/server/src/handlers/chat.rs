//! Conversation handlers
//!
//! Request/response surface for conversation bootstrap and history.
//! Posting here is the fallback path when the persistent channel is
//! unavailable; it shares the router's validation and persistence
//! contract but does not fan out (clients on this path poll or refetch,
//! matching the web app this replaces).

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{ChatError, Result};
use crate::models::{ConversationSnapshot, PostMessageInput};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

/// GET /chats
pub async fn list_chats(
    ctx: Ctx,
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationSnapshot>>> {
    info!("GET /chats - {}", ctx.user_id());

    let conversations = state.store.list_for_participant(ctx.user_id()).await;

    let mut snapshots = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        snapshots.push(state.router.build_snapshot(&conversation.id).await?);
    }

    Ok(Json(snapshots))
}

/// GET /chats/{user_id}
///
/// Fetch-or-create the conversation with the given counterpart.
pub async fn get_or_create_chat(
    ctx: Ctx,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ConversationSnapshot>> {
    info!("GET /chats/{} - {}", user_id, ctx.user_id());

    if user_id == ctx.user_id() {
        return Err(ChatError::InvalidParticipants);
    }

    // The counterpart must exist before a thread is created for it
    state
        .auth
        .get_user(&user_id)
        .await
        .map_err(|_| ChatError::NotFound("user"))?;

    let conv = state.store.find_or_create(ctx.user_id(), &user_id).await?;
    let conversation_id = conv.read().await.id.clone();

    let snapshot = state.router.build_snapshot(&conversation_id).await?;
    Ok(Json(snapshot))
}

/// POST /chats/{chat_id}/messages
pub async fn post_message(
    ctx: Ctx,
    Path(chat_id): Path<String>,
    State(state): State<AppState>,
    Json(input): Json<PostMessageInput>,
) -> Result<(StatusCode, Json<ConversationSnapshot>)> {
    info!("POST /chats/{}/messages - {}", chat_id, ctx.user_id());

    state
        .store
        .append_message(&chat_id, ctx.user_id(), &input.text)
        .await?;

    let snapshot = state.router.build_snapshot(&chat_id).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// PUT /chats/{chat_id}/messages/{message_id}/read
pub async fn mark_message_read(
    ctx: Ctx,
    Path((chat_id, message_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Value>> {
    info!(
        "PUT /chats/{}/messages/{}/read - {}",
        chat_id,
        message_id,
        ctx.user_id()
    );

    state
        .store
        .mark_read(&chat_id, &message_id, ctx.user_id())
        .await?;

    Ok(Json(json!({ "message": "Message marked as read" })))
}
