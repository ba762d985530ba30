use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public user info with presence fields (no sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A single direct message inside a conversation.
///
/// Immutable after creation except for the `read` flag, which only the
/// non-sender participant may flip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Position in the conversation log, assigned at append time.
    pub ordinal: u64,
    pub sender_id: String,
    pub text: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>, ordinal: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ordinal,
            sender_id: sender_id.into(),
            text: text.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// A durable per-pair message thread.
///
/// Exactly one conversation exists per unordered participant pair;
/// `participants` is stored in canonical (sorted) order and never
/// changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    pub fn new(a: &str, b: &str) -> Self {
        let (first, second) = canonical_pair(a, b);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            participants: [first, second],
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The other participant, if `user_id` is one of the two.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

/// Sort a pair of user ids so that both orderings map to the same key.
pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Conversation with populated participant summaries, as returned by
/// the fetch paths and carried in `new-message` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub id: String,
    pub participants: Vec<UserInfo>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationSnapshot {
    pub fn new(conversation: Conversation, participants: Vec<UserInfo>) -> Self {
        Self {
            id: conversation.id,
            participants,
            messages: conversation.messages,
            created_at: conversation.created_at,
            last_activity: conversation.last_activity,
        }
    }
}

/// Input for posting a message over the request/response surface.
#[derive(Debug, Deserialize)]
pub struct PostMessageInput {
    pub text: String,
}
