//! Persistence collaborators.
//!
//! One trait per record type, in the shape of the graph-service repository
//! traits. `InMemoryStore` backs tests and local development; `PgStore` is
//! the production backend. Both implement every trait, and `Repositories`
//! bundles them behind `Arc<dyn …>` so services never see the concrete store.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::{
    Conversation, Message, Review, ScheduleUpdate, Thread, Transaction, TransactionStatus, User,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Extra predicate a conditional update must satisfy besides the status match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorGuard {
    Participant(Uuid),
    Creator(Uuid),
}

impl ActorGuard {
    pub fn permits(&self, tx: &Transaction) -> bool {
        match self {
            ActorGuard::Participant(user_id) => tx.is_participant(*user_id),
            ActorGuard::Creator(user_id) => tx.creator_id == *user_id,
        }
    }
}

/// Compare-and-set on a transaction's status: applied only when the current
/// status is one of `expected` and the guard (if any) holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub transaction_id: Uuid,
    pub expected: Vec<TransactionStatus>,
    pub new_status: TransactionStatus,
    pub guard: Option<ActorGuard>,
}

impl StatusUpdate {
    pub fn new(
        transaction_id: Uuid,
        expected: &[TransactionStatus],
        new_status: TransactionStatus,
    ) -> Self {
        Self {
            transaction_id,
            expected: expected.to_vec(),
            new_status,
            guard: None,
        }
    }

    pub fn guarded(mut self, guard: ActorGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.id == self.transaction_id
            && self.expected.contains(&tx.status)
            && self.guard.map_or(true, |g| g.permits(tx))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub matched: usize,
}

#[async_trait::async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;

    /// Transactions the user takes part in, restricted to `statuses`, newest first
    async fn find_for_participant(
        &self,
        user_id: Uuid,
        statuses: &[TransactionStatus],
    ) -> Result<Vec<Transaction>>;

    /// Single atomic conditional update. `Ok(false)` means nothing matched.
    async fn compare_and_set_status(&self, update: &StatusUpdate) -> Result<bool>;

    /// Unordered batch: each update runs as its own atomic operation, a
    /// non-match never stops the rest. Updates are issued in slice order.
    async fn apply_status_updates(&self, updates: &[StatusUpdate]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut first_error = None;

        for update in updates {
            match self.compare_and_set_status(update).await {
                Ok(true) => outcome.matched += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        transaction_id = %update.transaction_id,
                        error = %e,
                        "conditional status update failed"
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) if outcome.matched == 0 => Err(e),
            _ => Ok(outcome),
        }
    }

    /// Applies the schedule fields when `participant` takes part in the
    /// transaction; returns the updated record, or `None` if nothing matched.
    async fn update_schedule(
        &self,
        id: Uuid,
        participant: Uuid,
        update: &ScheduleUpdate,
    ) -> Result<Option<Transaction>>;
}

#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<()>;

    /// Creates `thread` together with its first message. Either both are
    /// stored or neither is.
    async fn insert_with_thread(&self, thread: &Thread, message: &Message) -> Result<()>;

    /// Messages of a conversation in ascending send order
    async fn list(&self, conversation: Conversation) -> Result<Vec<Message>>;
}

#[async_trait::async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Thread>>;

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ReviewRepository: Send + Sync {
    /// `Ok(false)` when this creator already reviewed the transaction
    async fn insert(&self, review: &Review) -> Result<bool>;

    async fn list_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<Review>>;
}

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<User>>;

    /// Atomic set-add; returns the unread count afterwards
    async fn add_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize>;

    /// Atomic set-remove (absent entry is fine); returns the unread count afterwards
    async fn remove_unread(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize>;
}

#[derive(Clone)]
pub struct Repositories {
    pub transactions: Arc<dyn TransactionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub threads: Arc<dyn ThreadRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            transactions: store.clone(),
            messages: store.clone(),
            threads: store.clone(),
            reviews: store.clone(),
            users: store,
        }
    }

    pub fn postgres(store: Arc<PgStore>) -> Self {
        Self {
            transactions: store.clone(),
            messages: store.clone(),
            threads: store.clone(),
            reviews: store.clone(),
            users: store,
        }
    }
}
