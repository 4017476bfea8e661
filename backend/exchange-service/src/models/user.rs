use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub picture: Option<String>,
}

/// User record owned by the identity collaborator. This service only
/// reads it and maintains `unread_threads`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub profile: Profile,
    /// Conversations (thread or transaction ids) with unseen messages, set semantics
    pub unread_threads: Vec<Uuid>,
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            profile: Profile {
                name: name.into(),
                picture: None,
            },
            unread_threads: Vec::new(),
        }
    }

    /// Returns true when the conversation was not already unread
    pub fn mark_unread(&mut self, conversation_id: Uuid) -> bool {
        if self.unread_threads.contains(&conversation_id) {
            return false;
        }
        self.unread_threads.push(conversation_id);
        true
    }

    /// Removing an absent entry is a no-op
    pub fn acknowledge(&mut self, conversation_id: Uuid) {
        self.unread_threads.retain(|id| *id != conversation_id);
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.profile.name.clone(),
            picture: self.profile.picture.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub picture: Option<String>,
}
