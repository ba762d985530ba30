//! Taskline Chat Server Library
//!
//! Real-time direct messaging for the Taskline todo app: authenticated
//! WebSocket sessions, presence, typing indicators, and durable
//! per-pair conversation threads.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod error;
pub mod handlers;
pub mod models;
pub mod presence;
pub mod protocol;
pub mod router;
pub mod session;
pub mod store;

use axum::{middleware, routing::get, routing::post, routing::put, Router};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::{middleware::mw_require_auth, AuthManager};
use config::{AppState, ChatServerConfig};
use handlers::{
    get_or_create_chat, list_chats, list_users, login, logout, mark_message_read, me,
    post_message, signup, ws_handler,
};
use presence::PresenceRegistry;
use router::ChatRouter;
use store::ConversationStore;

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set, ignore
    }

    info!("=== Taskline Chat Server ===");
    info!("Features: Auth | Presence | Typing | Durable Conversations");

    let config = ChatServerConfig::default();
    config.ensure_dirs().await?;

    info!("Data directory: {:?}", config.base_dir);

    let state = build_state(config).await?;

    let app = app_router(state.clone());

    info!("Listening on http://{}", state.config.bind_addr);

    let listener = tokio::net::TcpListener::bind(state.config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire up the managers and shared state. Split out of `run` so tests
/// can stand up the full stack against a temp directory.
pub async fn build_state(config: ChatServerConfig) -> anyhow::Result<AppState> {
    let auth = Arc::new(AuthManager::new(&config.base_dir, config.session_ttl_days).await?);
    info!("Auth Manager initialized");

    let store = Arc::new(ConversationStore::new(config.clone()).await?);

    let registry = Arc::new(PresenceRegistry::new(auth.clone()));
    let router = Arc::new(ChatRouter::new(store.clone(), registry.clone(), auth.clone()));

    Ok(AppState {
        config,
        auth,
        store,
        registry,
        router,
    })
}

/// The full route table.
pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/users", get(list_users))
        .route("/chats", get(list_chats))
        .route("/chats/{user_id}", get(get_or_create_chat))
        .route("/chats/{chat_id}/messages", post(post_message))
        .route(
            "/chats/{chat_id}/messages/{message_id}/read",
            put(mark_message_read),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            mw_require_auth,
        ));

    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK - Taskline Chat Server"
}
