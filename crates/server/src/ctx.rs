use crate::error::ChatError;
use crate::models::UserInfo;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Authenticated request context, inserted by `mw_require_auth`.
#[derive(Clone, Debug)]
pub struct Ctx {
    user: UserInfo,
}

impl Ctx {
    pub fn new(user: UserInfo) -> Self {
        Self { user }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn user(&self) -> &UserInfo {
        &self.user
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Ctx>().cloned().ok_or(ChatError::Auth)
    }
}
