//! Authentication & user directory
//!
//! Handles user signup, login, and session tokens, and owns the durable
//! presence fields (`is_online`, `last_seen`) that the presence registry
//! updates on connect/disconnect. All user data is stored in a SQLite
//! database at `<base_dir>/users.sqlite`.

pub mod middleware;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::{Conversation, UserInfo};

/// User record stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Session token for authenticated requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The opaque "verify credential, obtain identity" capability the chat
/// core consumes. Connection admission calls this before any presence
/// state is created.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> std::result::Result<UserInfo, ChatError>;
}

/// Auth manager handles authentication and the user directory
pub struct AuthManager {
    db_path: std::path::PathBuf,
    session_ttl_days: i64,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    /// Create new auth manager
    pub async fn new(base_dir: &Path, session_ttl_days: i64) -> Result<Self> {
        let db_path = base_dir.join("users.sqlite");

        let manager = Self {
            db_path,
            session_ttl_days,
            sessions: RwLock::new(HashMap::new()),
        };

        manager.init_db().await?;

        info!("[Auth] Initialized at {:?}", manager.db_path);

        Ok(manager)
    }

    /// Get database connection
    async fn get_pool(&self) -> Result<sqlx::SqlitePool> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", self.db_path.display()))?
                .create_if_missing(true);
        Ok(SqlitePoolOptions::new().connect_with(options).await?)
    }

    /// Initialize database tables
    async fn init_db(&self) -> Result<()> {
        let pool = self.get_pool().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT,
                is_active INTEGER DEFAULT 1,
                is_online INTEGER DEFAULT 0,
                last_seen TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        // Nobody is online after a restart
        sqlx::query("UPDATE users SET is_online = 0")
            .execute(&pool)
            .await?;

        pool.close().await;
        Ok(())
    }

    /// Register a new user
    pub async fn signup(&self, email: String, username: String, password: String) -> Result<User> {
        let pool = self.get_pool().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&pool)
            .await?;

        if existing.is_some() {
            return Err(anyhow::anyhow!("Email already registered"));
        }

        let password_hash = hash(&password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            username: username.clone(),
            password_hash,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };

        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, created_at, is_active) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .bind(user.is_active)
        .execute(&pool)
        .await?;

        pool.close().await;

        info!("[Auth] User registered: {} ({})", username, email);

        Ok(user)
    }

    /// Login user and create session
    pub async fn login(&self, email: String, password: String) -> Result<(User, Session)> {
        let pool = self.get_pool().await?;

        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, email, username, password_hash, created_at FROM users WHERE email = ? AND is_active = 1"
        )
        .bind(&email)
        .fetch_optional(&pool)
        .await?;

        let (user_id, email, username, password_hash, created_at) =
            row.ok_or_else(|| anyhow::anyhow!("Invalid email or password"))?;

        let valid = verify(&password, &password_hash).context("Failed to verify password")?;

        if !valid {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(anyhow::anyhow!("Invalid email or password"));
        }

        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&user_id)
            .execute(&pool)
            .await?;

        let session = self.create_session(&pool, &user_id).await?;

        let user = User {
            id: user_id,
            email,
            username,
            password_hash: String::new(), // Don't return hash
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            last_login: Some(Utc::now()),
            is_active: true,
        };

        pool.close().await;

        info!("[Auth] User logged in: {}", user.username);

        Ok((user, session))
    }

    /// Create new session
    async fn create_session(&self, pool: &sqlx::SqlitePool, user_id: &str) -> Result<Session> {
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(self.session_ttl_days),
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(pool)
        .await?;

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Validate session token and return the identity behind it
    pub async fn validate_session(&self, token: &str) -> Result<UserInfo> {
        // Check cache first
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(token) {
                if session.expires_at > Utc::now() {
                    let user_id = session.user_id.clone();
                    drop(sessions);
                    return self.get_user(&user_id).await;
                }
            }
        }

        // Fall back to the database
        let pool = self.get_pool().await?;

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&pool)
                .await?;

        pool.close().await;

        if let Some((user_id, expires_at)) = row {
            let expires: DateTime<Utc> = expires_at
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid date"))?;
            if expires > Utc::now() {
                return self.get_user(&user_id).await;
            }
        }

        Err(anyhow::anyhow!("Invalid or expired session"))
    }

    /// Logout user (invalidate session)
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);

        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&pool)
            .await?;
        pool.close().await;

        info!("[Auth] Session invalidated");

        Ok(())
    }

    /// Update the durable presence fields for a user. Called by the
    /// presence registry on connect/disconnect.
    pub async fn set_presence(&self, user_id: &str, online: bool) -> Result<()> {
        let pool = self.get_pool().await?;

        sqlx::query("UPDATE users SET is_online = ?, last_seen = ? WHERE id = ?")
            .bind(online)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&pool)
            .await?;

        pool.close().await;
        Ok(())
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: &str) -> Result<UserInfo> {
        let pool = self.get_pool().await?;

        let row: Option<(String, String, String, bool, Option<String>)> = sqlx::query_as(
            "SELECT id, email, username, is_online, last_seen FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&pool)
        .await?;

        pool.close().await;

        row.map(user_info_from_row)
            .ok_or_else(|| anyhow::anyhow!("User not found"))
    }

    /// List all active users with their presence state (for the
    /// contact list in the UI)
    pub async fn list_users(&self) -> Result<Vec<UserInfo>> {
        let pool = self.get_pool().await?;

        let rows: Vec<(String, String, String, bool, Option<String>)> = sqlx::query_as(
            "SELECT id, email, username, is_online, last_seen FROM users WHERE is_active = 1",
        )
        .fetch_all(&pool)
        .await?;

        pool.close().await;

        Ok(rows.into_iter().map(user_info_from_row).collect())
    }

    /// Resolve both participants of a conversation to their public
    /// summaries (the equivalent of the populated participant list the
    /// clients render from).
    pub async fn populate_participants(&self, conversation: &Conversation) -> Result<Vec<UserInfo>> {
        let mut participants = Vec::with_capacity(2);
        for user_id in &conversation.participants {
            participants.push(self.get_user(user_id).await?);
        }
        Ok(participants)
    }
}

#[async_trait]
impl IdentityVerifier for AuthManager {
    async fn verify(&self, credential: &str) -> std::result::Result<UserInfo, ChatError> {
        self.validate_session(credential)
            .await
            .map_err(|_| ChatError::Auth)
    }
}

fn user_info_from_row(
    (id, email, username, is_online, last_seen): (String, String, String, bool, Option<String>),
) -> UserInfo {
    UserInfo {
        id,
        username,
        email,
        is_online,
        last_seen: last_seen.and_then(|s| s.parse().ok()),
    }
}
