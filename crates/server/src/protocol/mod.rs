//! Wire events for the persistent connection
//!
//! Every frame is a JSON object tagged by `event`, with the payload
//! under `data`. Client-to-server: `join`, `send`, `typing`.
//! Server-to-client: `new-message`, `typing`, `user-online`,
//! `user-offline`, `error`.

use serde::{Deserialize, Serialize};

use crate::models::{ConversationSnapshot, Message};

/// Events a connected client may emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Join {
        conversation_id: String,
    },
    Send {
        conversation_id: String,
        text: String,
    },
    Typing {
        conversation_id: String,
        is_typing: bool,
    },
}

/// Events the server delivers to sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Delivered to every session joined to the conversation's room,
    /// including the sender (the echo carries the server-assigned
    /// ordinal and timestamp).
    NewMessage {
        conversation: ConversationSnapshot,
        message: Message,
    },
    /// Delivered to everyone in the room except the sender.
    Typing {
        sender_id: String,
        sender_name: String,
        is_typing: bool,
    },
    UserOnline {
        user_id: String,
    },
    UserOffline {
        user_id: String,
    },
    Error {
        message: String,
    },
}
