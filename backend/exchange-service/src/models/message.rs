use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// What a message belongs to: a standalone thread or a transaction. Never both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Conversation {
    Thread(Uuid),
    Transaction(Uuid),
}

impl Conversation {
    pub fn id(&self) -> Uuid {
        match self {
            Conversation::Thread(id) | Conversation::Transaction(id) => *id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Conversation::Thread(_) => "thread",
            Conversation::Transaction(_) => "transaction",
        }
    }
}

/// Immutable chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub conversation: Conversation,
}

impl Message {
    pub fn new(sender_id: Uuid, body: String, conversation: Conversation) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            body,
            sent_at: Utc::now(),
            conversation,
        }
    }
}

/// Where a new message should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    Thread(Uuid),
    Transaction(Uuid),
    /// Create a thread with these recipients (sender is added implicitly)
    NewThread { recipients: Vec<Uuid> },
}

impl MessageTarget {
    /// Resolve the loose client form (`thread_id` / `transaction_id` /
    /// `is_new_thread` + `to`) into exactly one target.
    pub fn from_parts(
        thread_id: Option<Uuid>,
        transaction_id: Option<Uuid>,
        is_new_thread: bool,
        to: Vec<Uuid>,
    ) -> Result<Self, AppError> {
        match (is_new_thread, thread_id, transaction_id) {
            (true, None, None) => Ok(MessageTarget::NewThread { recipients: to }),
            (false, Some(id), None) => Ok(MessageTarget::Thread(id)),
            (false, None, Some(id)) => Ok(MessageTarget::Transaction(id)),
            _ => Err(AppError::Validation(
                "message needs exactly one of thread_id, transaction_id or is_new_thread".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub id: Uuid,
    /// Sorted, distinct, at least two users
    pub participants: Vec<Uuid>,
    pub last_updated: DateTime<Utc>,
}

impl Thread {
    pub fn new(sender_id: Uuid, recipients: &[Uuid]) -> Self {
        let mut participants: Vec<Uuid> = recipients.to_vec();
        participants.push(sender_id);
        participants.sort();
        participants.dedup();

        Self {
            id: Uuid::new_v4(),
            participants,
            last_updated: Utc::now(),
        }
    }
}

/// Result of persisting a message, before any delivery happens
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub message: Message,
    /// Everyone in the conversation, sender included
    pub participants: Vec<Uuid>,
    pub created_thread: bool,
}

impl PostedMessage {
    pub fn recipients(&self) -> impl Iterator<Item = Uuid> + '_ {
        let sender = self.message.sender_id;
        self.participants.iter().copied().filter(move |id| *id != sender)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorView {
    pub id: Uuid,
    pub name: String,
    pub picture: Option<String>,
    pub is_me: bool,
}

/// Message as seen by a particular viewer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    pub id: Uuid,
    pub message: String,
    pub time_sent: DateTime<Utc>,
    pub author: AuthorView,
}
