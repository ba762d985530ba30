//! Chat server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthManager;
use crate::presence::PresenceRegistry;
use crate::router::ChatRouter;
use crate::store::ConversationStore;

/// Configuration for the Taskline chat server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// Base data directory (users.sqlite lives here)
    pub base_dir: PathBuf,
    /// Storage directory for conversation files
    pub storage_dir: PathBuf,
    /// Address to bind the HTTP/WebSocket listener to
    pub bind_addr: SocketAddr,
    /// A session with no inbound traffic for this long is treated as
    /// disconnected, so stale presence entries cannot leak.
    pub liveness_grace: Duration,
    /// Auth session lifetime in days
    pub session_ttl_days: i64,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        let base_dir = std::env::var("TASKLINE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("taskline_data"));
        Self::with_base_dir(base_dir)
    }
}

impl ChatServerConfig {
    /// Create config rooted at a custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            storage_dir: base_dir.join("conversations"),
            base_dir,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            liveness_grace: Duration::from_secs(60),
            session_ttl_days: 30,
        }
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ChatServerConfig,
    pub auth: Arc<AuthManager>,
    pub store: Arc<ConversationStore>,
    pub registry: Arc<PresenceRegistry>,
    pub router: Arc<ChatRouter>,
}
