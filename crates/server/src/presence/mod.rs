//! Presence registry
//!
//! Process-wide mapping from user identity to the active session
//! handle. Injectable and lifecycle-scoped (held in `AppState`), not a
//! hidden global. Policy for a second connection by the same identity
//! is last-writer-wins: the newest handle replaces the old one, and the
//! orphaned connection's later disconnect must not knock the newer one
//! offline, so removal is guarded by session id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::auth::AuthManager;
use crate::session::{SessionHandle, SessionId};

pub struct PresenceRegistry {
    /// User directory holding the durable presence fields
    directory: Arc<AuthManager>,
    online: RwLock<HashMap<String, SessionHandle>>,
}

impl PresenceRegistry {
    pub fn new(directory: Arc<AuthManager>) -> Self {
        Self {
            directory,
            online: RwLock::new(HashMap::new()),
        }
    }

    /// Record a session as the active connection for its identity.
    /// Returns true if the identity was not already online (the caller
    /// then announces the transition).
    pub async fn register(&self, handle: SessionHandle) -> bool {
        let user_id = handle.user.id.clone();
        let newly_online = {
            let mut online = self.online.write().await;
            online.insert(user_id.clone(), handle).is_none()
        };

        if let Err(e) = self.directory.set_presence(&user_id, true).await {
            warn!("Failed to persist online flag for {}: {}", user_id, e);
        }

        newly_online
    }

    /// Remove a session's registration. Returns true if the identity
    /// actually went offline (a newer session for the same identity
    /// keeps the entry).
    pub async fn unregister(&self, user_id: &str, session_id: SessionId) -> bool {
        let went_offline = {
            let mut online = self.online.write().await;
            match online.get(user_id) {
                Some(current) if current.session_id == session_id => {
                    online.remove(user_id);
                    true
                }
                _ => false,
            }
        };

        if went_offline {
            if let Err(e) = self.directory.set_presence(user_id, false).await {
                warn!("Failed to persist offline flag for {}: {}", user_id, e);
            }
        }

        went_offline
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.online.read().await.contains_key(user_id)
    }

    /// Copy out the current recipient set so fan-out runs without
    /// holding the registry lock.
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        self.online.read().await.values().cloned().collect()
    }
}
