//! JSON-based conversation storage
//!
//! One JSON file per conversation, written atomically (temp file +
//! rename). All conversations are loaded into memory at startup; each
//! lives behind its own `RwLock`, which is the single append point that
//! serializes writes per conversation while leaving unrelated
//! conversations fully parallel.

use crate::config::ChatServerConfig;
use crate::error::{ChatError, Result};
use crate::models::{canonical_pair, Conversation, Message};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct ConversationStore {
    config: ChatServerConfig,
    /// All known conversations, keyed by conversation id
    conversations: RwLock<HashMap<String, Arc<RwLock<Conversation>>>>,
    /// Canonical participant pair -> conversation id. Creation runs
    /// under this map's write lock, so concurrent first contact from
    /// both sides converges on exactly one conversation.
    pair_index: RwLock<HashMap<(String, String), String>>,
}

impl ConversationStore {
    pub async fn new(config: ChatServerConfig) -> Result<Self> {
        config.ensure_dirs().await.map_err(ChatError::from)?;

        let store = Self {
            config,
            conversations: RwLock::new(HashMap::new()),
            pair_index: RwLock::new(HashMap::new()),
        };

        store.load_existing().await?;

        info!(
            "ConversationStore initialized with {} conversations",
            store.conversations.read().await.len()
        );

        Ok(store)
    }

    fn conversation_path(&self, conversation_id: &str) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{}.json", conversation_id))
    }

    /// Load all existing conversations from disk
    async fn load_existing(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.config.storage_dir).await?;
        let mut count = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Conversation>(&content) {
                Ok(conversation) => {
                    let [a, b] = conversation.participants.clone();
                    let id = conversation.id.clone();
                    self.pair_index.write().await.insert((a, b), id.clone());
                    self.conversations
                        .write()
                        .await
                        .insert(id, Arc::new(RwLock::new(conversation)));
                    count += 1;
                }
                Err(e) => {
                    warn!("Skipping unreadable conversation file {:?}: {}", path, e);
                }
            }
        }

        info!("Loaded {} conversations from disk", count);
        Ok(())
    }

    /// Save a conversation to disk atomically
    async fn save_to_disk(&self, conversation: &Conversation) -> Result<()> {
        let path = self.conversation_path(&conversation.id);
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(conversation)?;

        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    /// Look up or lazily create the conversation for an unordered pair
    /// of participants. Order independent and idempotent; at most one
    /// conversation ever exists per pair.
    pub async fn find_or_create(
        &self,
        participant_a: &str,
        participant_b: &str,
    ) -> Result<Arc<RwLock<Conversation>>> {
        if participant_a == participant_b {
            return Err(ChatError::InvalidParticipants);
        }

        let key = canonical_pair(participant_a, participant_b);

        // Fast path: already known
        {
            let index = self.pair_index.read().await;
            if let Some(id) = index.get(&key) {
                if let Some(conv) = self.conversations.read().await.get(id) {
                    return Ok(conv.clone());
                }
            }
        }

        // Creation critical section: re-check under the write lock
        let mut index = self.pair_index.write().await;
        if let Some(id) = index.get(&key) {
            if let Some(conv) = self.conversations.read().await.get(id) {
                return Ok(conv.clone());
            }
        }

        let conversation = Conversation::new(participant_a, participant_b);
        self.save_to_disk(&conversation).await?;

        let id = conversation.id.clone();
        let conv = Arc::new(RwLock::new(conversation));
        index.insert(key, id.clone());
        self.conversations.write().await.insert(id.clone(), conv.clone());

        info!("Created conversation {}", id);

        Ok(conv)
    }

    /// Get a conversation by id
    pub async fn get(&self, conversation_id: &str) -> Option<Arc<RwLock<Conversation>>> {
        self.conversations.read().await.get(conversation_id).cloned()
    }

    /// Append a message to a conversation.
    ///
    /// The conversation's write lock is held across validation, ordinal
    /// assignment, and the durable save, so concurrent sends to the
    /// same conversation serialize and ordinals are strictly
    /// increasing. The append is only visible once it hit disk.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyText);
        }

        let conv = self
            .get(conversation_id)
            .await
            .ok_or(ChatError::NotFound("conversation"))?;

        let mut conversation = conv.write().await;

        if !conversation.is_participant(sender_id) {
            return Err(ChatError::NotAMember);
        }

        let message = Message::new(sender_id, text, conversation.messages.len() as u64);
        conversation.messages.push(message.clone());
        conversation.last_activity = message.created_at;

        if let Err(e) = self.save_to_disk(&conversation).await {
            // The append did not durably succeed; undo it so nothing
            // observes a message that was never persisted.
            conversation.messages.pop();
            return Err(e);
        }

        Ok(message)
    }

    /// Mark a message as read on behalf of `requester_id`.
    ///
    /// A sender marking their own message is a silent no-op (product
    /// policy inherited from the web app); anyone outside the
    /// conversation is rejected.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        message_id: &str,
        requester_id: &str,
    ) -> Result<()> {
        let conv = self
            .get(conversation_id)
            .await
            .ok_or(ChatError::NotFound("conversation"))?;

        let mut conversation = conv.write().await;

        if !conversation.is_participant(requester_id) {
            return Err(ChatError::NotAMember);
        }

        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(ChatError::NotFound("message"))?;

        if message.sender_id == requester_id || message.read {
            return Ok(());
        }

        message.read = true;
        self.save_to_disk(&conversation).await?;

        Ok(())
    }

    /// All conversations a user participates in, most recently active
    /// first.
    pub async fn list_for_participant(&self, user_id: &str) -> Vec<Conversation> {
        let conversations = self.conversations.read().await;
        let mut result = Vec::new();
        for conv in conversations.values() {
            let conversation = conv.read().await;
            if conversation.is_participant(user_id) {
                result.push(conversation.clone());
            }
        }
        result.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        result
    }
}
