use super::{
    MessageRepository, ReviewRepository, StatusUpdate, ThreadRepository, TransactionRepository,
    UserRepository,
};
use crate::error::{AppError, Result};
use crate::models::{
    Conversation, Message, Review, ScheduleUpdate, Thread, Transaction, TransactionStatus, User,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local document store. Every mutation takes the collection's
/// write lock, so each conditional update is atomic with respect to the others.
#[derive(Default)]
pub struct InMemoryStore {
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    messages: RwLock<Vec<Message>>,
    threads: RwLock<HashMap<Uuid, Thread>>,
    reviews: RwLock<Vec<Review>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record; the identity collaborator owns users in production.
    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    #[cfg(test)]
    pub(crate) async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait::async_trait]
impl TransactionRepository for InMemoryStore {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        self.transactions.write().await.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn find_for_participant(
        &self,
        user_id: Uuid,
        statuses: &[TransactionStatus],
    ) -> Result<Vec<Transaction>> {
        let guard = self.transactions.read().await;
        let mut found: Vec<Transaction> = guard
            .values()
            .filter(|tx| tx.is_participant(user_id) && statuses.contains(&tx.status))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn compare_and_set_status(&self, update: &StatusUpdate) -> Result<bool> {
        let mut guard = self.transactions.write().await;
        match guard.get_mut(&update.transaction_id) {
            Some(tx) if update.matches(tx) => {
                tx.status = update.new_status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_schedule(
        &self,
        id: Uuid,
        participant: Uuid,
        update: &ScheduleUpdate,
    ) -> Result<Option<Transaction>> {
        let mut guard = self.transactions.write().await;
        match guard.get_mut(&id) {
            Some(tx) if tx.is_participant(participant) => {
                tx.apply_schedule(update);
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn insert_with_thread(&self, thread: &Thread, message: &Message) -> Result<()> {
        // Both locks held, so readers never see the thread without its message
        let mut threads = self.threads.write().await;
        let mut messages = self.messages.write().await;
        threads.insert(thread.id, thread.clone());
        messages.push(message.clone());
        Ok(())
    }

    async fn list(&self, conversation: Conversation) -> Result<Vec<Message>> {
        let guard = self.messages.read().await;
        let mut found: Vec<Message> = guard
            .iter()
            .filter(|m| m.conversation == conversation)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        found.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        Ok(found)
    }
}

#[async_trait::async_trait]
impl ThreadRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Thread>> {
        Ok(self.threads.read().await.get(&id).cloned())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut guard = self.threads.write().await;
        let thread = guard
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("thread {id}")))?;
        thread.last_updated = at;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReviewRepository for InMemoryStore {
    async fn insert(&self, review: &Review) -> Result<bool> {
        let mut guard = self.reviews.write().await;
        let duplicate = guard.iter().any(|r| {
            r.transaction_id == review.transaction_id && r.creator_id == review.creator_id
        });
        if duplicate {
            return Ok(false);
        }
        guard.push(review.clone());
        Ok(true)
    }

    async fn list_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<Review>> {
        let guard = self.reviews.read().await;
        Ok(guard
            .iter()
            .filter(|r| r.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        let guard = self.users.read().await;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    async fn add_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize> {
        let mut guard = self.users.write().await;
        let user = guard
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;
        user.mark_unread(conversation_id);
        Ok(user.unread_threads.len())
    }

    async fn remove_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize> {
        let mut guard = self.users.write().await;
        let user = guard
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;
        user.acknowledge(conversation_id);
        Ok(user.unread_threads.len())
    }
}
