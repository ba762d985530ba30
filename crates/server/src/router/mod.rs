//! Message router / broadcast engine
//!
//! Joins the two independently testable phases of delivery: durable
//! append through the conversation store, then fan-out to the sessions
//! joined to the conversation's room. Also owns presence transitions:
//! session connect/disconnect flows through here so `user-online` and
//! `user-offline` reach every connected session.
//!
//! Membership violations on `join` and `send` are dropped without any
//! event to the peer, so probing for the existence of someone else's
//! conversation reveals nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::AuthManager;
use crate::error::Result;
use crate::models::ConversationSnapshot;
use crate::presence::PresenceRegistry;
use crate::protocol::ServerEvent;
use crate::session::{SessionHandle, SessionId};
use crate::store::ConversationStore;

pub struct ChatRouter {
    store: Arc<ConversationStore>,
    registry: Arc<PresenceRegistry>,
    auth: Arc<AuthManager>,
    /// Every live session, keyed by session id
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    /// Conversation id -> sessions joined to its room. Purely for
    /// broadcast routing, never persisted.
    rooms: RwLock<HashMap<String, HashSet<SessionId>>>,
}

impl ChatRouter {
    pub fn new(
        store: Arc<ConversationStore>,
        registry: Arc<PresenceRegistry>,
        auth: Arc<AuthManager>,
    ) -> Self {
        Self {
            store,
            registry,
            auth,
            sessions: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Admit an authenticated session: track it, register presence,
    /// and announce the online transition to everyone else.
    pub async fn connect(&self, handle: SessionHandle) {
        let user_id = handle.user.id.clone();

        self.sessions
            .write()
            .await
            .insert(handle.session_id, handle.clone());

        let newly_online = self.registry.register(handle).await;
        if newly_online {
            self.broadcast_presence(ServerEvent::UserOnline { user_id: user_id.clone() }, &user_id)
                .await;
        }
    }

    /// Join a session to a conversation's room. Non-participants are
    /// dropped silently.
    pub async fn handle_join(&self, handle: &SessionHandle, conversation_id: &str) {
        let Some(conv) = self.store.get(conversation_id).await else {
            debug!("join: unknown conversation {}", conversation_id);
            return;
        };

        if !conv.read().await.is_participant(&handle.user.id) {
            debug!(
                "join: {} is not a participant of {}",
                handle.user.id, conversation_id
            );
            return;
        }

        self.rooms
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .insert(handle.session_id);

        info!(
            "{} joined room {}",
            handle.user.username, conversation_id
        );
    }

    /// Persist a message, then fan the confirmed copy out to every
    /// session in the room, the sender included. Nothing is broadcast
    /// unless the append durably succeeded.
    pub async fn handle_send(&self, handle: &SessionHandle, conversation_id: &str, text: &str) {
        let message = match self
            .store
            .append_message(conversation_id, &handle.user.id, text)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                debug!("send rejected for {}: {}", handle.user.id, e);
                handle.send(ServerEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        let snapshot = match self.build_snapshot(conversation_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to build snapshot for {}: {}", conversation_id, e);
                handle.send(ServerEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        let recipients = self.room_members(conversation_id, None).await;
        for recipient in recipients {
            let delivered = recipient.send(ServerEvent::NewMessage {
                conversation: snapshot.clone(),
                message: message.clone(),
            });
            if !delivered {
                // The append is the source of truth; a failed delivery
                // is logged and the client recovers via the fetch path.
                warn!(
                    "Dropped new-message delivery to session {}",
                    recipient.session_id
                );
            }
        }
    }

    /// Relay a typing signal to everyone else in the room. Membership
    /// is implicit in the join state; typing is never persisted.
    pub async fn handle_typing(&self, handle: &SessionHandle, conversation_id: &str, is_typing: bool) {
        let joined = self
            .rooms
            .read()
            .await
            .get(conversation_id)
            .is_some_and(|members| members.contains(&handle.session_id));
        if !joined {
            return;
        }

        let recipients = self
            .room_members(conversation_id, Some(handle.session_id))
            .await;
        for recipient in recipients {
            recipient.send(ServerEvent::Typing {
                sender_id: handle.user.id.clone(),
                sender_name: handle.user.username.clone(),
                is_typing,
            });
        }
    }

    /// Tear a session down: leave every room, then unregister presence
    /// and announce the offline transition if the identity actually
    /// went offline.
    pub async fn handle_disconnect(&self, handle: &SessionHandle) {
        {
            let mut rooms = self.rooms.write().await;
            for members in rooms.values_mut() {
                members.remove(&handle.session_id);
            }
            rooms.retain(|_, members| !members.is_empty());
        }

        self.sessions.write().await.remove(&handle.session_id);

        let went_offline = self
            .registry
            .unregister(&handle.user.id, handle.session_id)
            .await;
        if went_offline {
            self.broadcast_presence(
                ServerEvent::UserOffline {
                    user_id: handle.user.id.clone(),
                },
                &handle.user.id,
            )
            .await;
        }
    }

    /// Conversation snapshot with populated participant summaries.
    pub async fn build_snapshot(&self, conversation_id: &str) -> Result<ConversationSnapshot> {
        let conv = self
            .store
            .get(conversation_id)
            .await
            .ok_or(crate::error::ChatError::NotFound("conversation"))?;
        let conversation = conv.read().await.clone();
        let participants = self.auth.populate_participants(&conversation).await?;
        Ok(ConversationSnapshot::new(conversation, participants))
    }

    /// Handles of the sessions joined to a room, minus an optional
    /// excluded session. Locks are released before the caller sends.
    async fn room_members(
        &self,
        conversation_id: &str,
        exclude: Option<SessionId>,
    ) -> Vec<SessionHandle> {
        let member_ids: Vec<SessionId> = match self.rooms.read().await.get(conversation_id) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|id| Some(*id) != exclude)
                .collect(),
            None => return Vec::new(),
        };

        let sessions = self.sessions.read().await;
        member_ids
            .iter()
            .filter_map(|id| sessions.get(id).cloned())
            .collect()
    }

    /// Deliver a presence transition to every connected session except
    /// the subject's own.
    async fn broadcast_presence(&self, event: ServerEvent, subject_user_id: &str) {
        let recipients: Vec<SessionHandle> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.user.id != subject_user_id)
                .cloned()
                .collect()
        };

        for recipient in recipients {
            if !recipient.send(event.clone()) {
                warn!(
                    "Dropped presence delivery to session {}",
                    recipient.session_id
                );
            }
        }
    }
}
