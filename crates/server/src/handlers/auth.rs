//! Auth handlers

use crate::config::AppState;
use crate::ctx::Ctx;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::middleware::bearer_token;
use crate::models::UserInfo;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("POST /auth/signup - {}", req.email);

    match state
        .auth
        .signup(req.email.clone(), req.username.clone(), req.password.clone())
        .await
    {
        Ok(user) => match state.auth.login(req.email.clone(), req.password).await {
            Ok((_, session)) => {
                info!("User {} registered successfully", req.email);
                Ok(Json(AuthResponse {
                    token: session.token,
                    user_id: user.id,
                    username: user.username,
                }))
            }
            Err(e) => {
                warn!("Login after signup failed: {}", e);
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Account created but login failed".to_string(),
                    }),
                ))
            }
        },
        Err(e) => {
            warn!("Signup failed for {}: {}", req.email, e);
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("POST /auth/login - {}", req.email);

    match state.auth.login(req.email.clone(), req.password).await {
        Ok((user, session)) => {
            info!("User {} logged in successfully", req.email);
            Ok(Json(AuthResponse {
                token: session.token,
                user_id: user.id,
                username: user.username,
            }))
        }
        Err(e) => {
            warn!("Login failed for {}: {}", req.email, e);
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid credentials".to_string(),
                }),
            ))
        }
    }
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    info!("POST /auth/logout");

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token);

    if let Some(token) = token {
        if let Err(e) = state.auth.logout(token).await {
            warn!("Logout failed: {}", e);
        }
    }

    StatusCode::OK
}

/// GET /auth/me
pub async fn me(ctx: Ctx) -> Json<UserInfo> {
    info!("GET /auth/me - {}", ctx.user_id());
    Json(ctx.user().clone())
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserInfo>>, StatusCode> {
    info!("GET /users");

    match state.auth.list_users().await {
        Ok(users) => Ok(Json(users)),
        Err(e) => {
            warn!("Failed to list users: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
