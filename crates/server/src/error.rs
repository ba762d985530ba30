//! Error taxonomy for the chat core.
//!
//! Membership violations on the socket path are dropped silently by the
//! router; this type only reaches clients through the request/response
//! surface, where `NotAMember` maps to a generic 403.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid or expired credential")]
    Auth,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not authorized")]
    NotAMember,

    #[error("message text is required")]
    EmptyText,

    #[error("cannot chat with yourself")]
    InvalidParticipants,

    #[error("storage unavailable: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match self {
            ChatError::Auth => StatusCode::UNAUTHORIZED,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::NotAMember => StatusCode::FORBIDDEN,
            ChatError::EmptyText | ChatError::InvalidParticipants => StatusCode::BAD_REQUEST,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Storage(err.to_string())
    }
}
