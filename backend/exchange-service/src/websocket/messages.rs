/// WebSocket event types for chat and live exchange updates
use crate::models::{Conversation, MessageView, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client → server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInboundEvent {
    SendMessage {
        message: String,
        #[serde(default)]
        thread_id: Option<Uuid>,
        #[serde(default)]
        transaction_id: Option<Uuid>,
        #[serde(default)]
        is_new_thread: bool,
        #[serde(default)]
        to: Vec<Uuid>,
    },
    Ping {
        timestamp: i64,
    },
}

impl WsInboundEvent {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Server → client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutboundEvent {
    Connected {
        user_id: Uuid,
        timestamp: i64,
    },
    NewMessage {
        conversation: Conversation,
        message: MessageView,
    },
    /// Answer to the sender's own `send_message`
    MessageAccepted {
        message_id: Uuid,
        conversation: Conversation,
    },
    TransactionUpdated {
        transaction: Transaction,
    },
    UnreadCount {
        count: usize,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        code: String,
        message: String,
    },
}

impl WsOutboundEvent {
    pub fn connected(user_id: Uuid) -> Self {
        WsOutboundEvent::Connected {
            user_id,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn pong(timestamp: i64) -> Self {
        WsOutboundEvent::Pong { timestamp }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        WsOutboundEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
