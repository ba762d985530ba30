//! HTTP handlers
//!
//! The request/response surface for auth and conversation bootstrap,
//! plus the WebSocket upgrade for the persistent event channel.

pub mod auth;
pub mod chat;
pub mod socket;

pub use auth::{list_users, login, logout, me, signup};
pub use chat::{get_or_create_chat, list_chats, mark_message_read, post_message};
pub use socket::ws_handler;
