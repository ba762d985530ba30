use crate::auth::IdentityVerifier;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::ChatError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Extract the bearer token from an Authorization header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}

pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ChatError> {
    debug!("MIDDLEWARE: require_auth");

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ChatError::Auth)?;

    let user = state.auth.verify(token).await?;

    req.extensions_mut().insert(Ctx::new(user));

    Ok(next.run(req).await)
}
