//! # Message Service
//!
//! Persists chat messages into threads or transactions and maintains the
//! per-user unread set. Delivery is not done here: `DeliveryCoordinator`
//! fans out only after `post_message` has returned.

use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    AuthorView, Conversation, Message, MessageTarget, MessageView, PostedMessage, Thread, User,
};
use crate::repository::Repositories;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageService {
    repos: Repositories,
}

impl MessageService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Participants of a conversation, or NotFound when it does not exist
    pub async fn participants_of(&self, conversation: Conversation) -> Result<Vec<Uuid>> {
        match conversation {
            Conversation::Thread(id) => self
                .repos
                .threads
                .find_by_id(id)
                .await?
                .map(|t| t.participants)
                .ok_or_else(|| AppError::NotFound(format!("thread {id}"))),
            Conversation::Transaction(id) => self
                .repos
                .transactions
                .find_by_id(id)
                .await?
                .map(|t| t.participants)
                .ok_or_else(|| AppError::NotFound(format!("transaction {id}"))),
        }
    }

    /// Conversation and participants for `target`. A new thread is only built
    /// here; it is stored together with its first message.
    async fn resolve_target(
        &self,
        sender_id: Uuid,
        target: MessageTarget,
    ) -> Result<(Conversation, Vec<Uuid>, Option<Thread>)> {
        match target {
            MessageTarget::NewThread { recipients } => {
                let recipients: Vec<Uuid> =
                    recipients.into_iter().filter(|id| *id != sender_id).collect();
                if recipients.is_empty() {
                    return Err(AppError::Validation(
                        "a new thread needs at least one recipient".into(),
                    ));
                }

                let thread = Thread::new(sender_id, &recipients);
                let known = self.repos.users.find_many(&thread.participants).await?;
                if known.len() != thread.participants.len() {
                    return Err(AppError::NotFound("thread recipient".into()));
                }

                Ok((
                    Conversation::Thread(thread.id),
                    thread.participants.clone(),
                    Some(thread),
                ))
            }
            MessageTarget::Thread(id) => {
                let conversation = Conversation::Thread(id);
                let participants = self.participants_of(conversation).await?;
                Ok((conversation, participants, None))
            }
            MessageTarget::Transaction(id) => {
                let conversation = Conversation::Transaction(id);
                let participants = self.participants_of(conversation).await?;
                Ok((conversation, participants, None))
            }
        }
    }

    /// Durably store a message. Returns once the write is confirmed.
    pub async fn post_message(
        &self,
        sender_id: Uuid,
        body: &str,
        target: MessageTarget,
    ) -> Result<PostedMessage> {
        if body.trim().is_empty() {
            return Err(AppError::Validation("message cannot be blank".into()));
        }

        let (conversation, participants, new_thread) =
            self.resolve_target(sender_id, target).await?;
        let created_thread = new_thread.is_some();

        if !participants.contains(&sender_id) {
            return Err(AppError::Forbidden(format!(
                "user {sender_id} is not part of this {}",
                conversation.label()
            )));
        }

        let message = Message::new(sender_id, body.to_string(), conversation);
        match new_thread {
            Some(thread) => {
                self.repos
                    .messages
                    .insert_with_thread(&thread, &message)
                    .await?;
                tracing::info!(
                    thread_id = %thread.id,
                    participants = thread.participants.len(),
                    "created thread"
                );
            }
            None => {
                self.repos.messages.insert(&message).await?;
                if let Conversation::Thread(thread_id) = conversation {
                    if let Err(e) = self.repos.threads.touch(thread_id, message.sent_at).await {
                        tracing::warn!(%thread_id, error = %e, "failed to bump thread timestamp");
                    }
                }
            }
        }

        metrics::record_message(conversation.label());
        tracing::debug!(
            message_id = %message.id,
            conversation = conversation.label(),
            conversation_id = %conversation.id(),
            "message persisted"
        );

        Ok(PostedMessage {
            message,
            participants,
            created_thread,
        })
    }

    /// Messages in ascending send order, with authors resolved relative to `viewer_id`
    pub async fn list_messages(
        &self,
        conversation: Conversation,
        viewer_id: Uuid,
    ) -> Result<Vec<MessageView>> {
        let participants = self.participants_of(conversation).await?;
        if !participants.contains(&viewer_id) {
            return Err(AppError::Forbidden(format!(
                "user {viewer_id} is not part of this {}",
                conversation.label()
            )));
        }

        let messages = self.repos.messages.list(conversation).await?;

        let mut sender_ids: Vec<Uuid> = messages.iter().map(|m| m.sender_id).collect();
        sender_ids.sort();
        sender_ids.dedup();
        let authors: HashMap<Uuid, User> = self
            .repos
            .users
            .find_many(&sender_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(messages
            .into_iter()
            .map(|m| {
                let author = authors.get(&m.sender_id);
                to_view(m, author, viewer_id)
            })
            .collect())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<usize> {
        self.repos
            .users
            .find_by_id(user_id)
            .await?
            .map(|u| u.unread_threads.len())
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }

    /// Clear one conversation from the unread set; clearing twice is harmless
    pub async fn acknowledge(&self, user_id: Uuid, conversation_id: Uuid) -> Result<usize> {
        self.repos.users.remove_unread(user_id, conversation_id).await
    }
}

pub(crate) fn to_view(message: Message, author: Option<&User>, viewer_id: Uuid) -> MessageView {
    let author = match author {
        Some(user) => AuthorView {
            id: user.id,
            name: user.profile.name.clone(),
            picture: user.profile.picture.clone(),
            is_me: user.id == viewer_id,
        },
        None => AuthorView {
            id: message.sender_id,
            name: "Unknown user".to_string(),
            picture: None,
            is_me: message.sender_id == viewer_id,
        },
    };

    MessageView {
        id: message.id,
        message: message.body,
        time_sent: message.sent_at,
        author,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryStore, MessageRepository};
    use std::sync::Arc;

    struct FailingMessages;

    #[async_trait::async_trait]
    impl MessageRepository for FailingMessages {
        async fn insert(&self, _message: &Message) -> Result<()> {
            Err(AppError::Database("disk full".into()))
        }

        async fn insert_with_thread(&self, _thread: &Thread, _message: &Message) -> Result<()> {
            Err(AppError::Database("disk full".into()))
        }

        async fn list(&self, _conversation: Conversation) -> Result<Vec<Message>> {
            Ok(vec![])
        }
    }

    async fn setup() -> (MessageService, User, User) {
        let store = Arc::new(InMemoryStore::new());
        let ada = User::new("ada@example.com", "Ada");
        let bea = User::new("bea@example.com", "Bea");
        store.insert_user(ada.clone()).await;
        store.insert_user(bea.clone()).await;
        (
            MessageService::new(Repositories::in_memory(store)),
            ada,
            bea,
        )
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let (service, ada, bea) = setup().await;
        let result = service
            .post_message(
                ada.id,
                "   ",
                MessageTarget::NewThread {
                    recipients: vec![bea.id],
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_new_thread_then_reply() {
        let (service, ada, bea) = setup().await;
        let first = service
            .post_message(
                ada.id,
                "hello",
                MessageTarget::NewThread {
                    recipients: vec![bea.id],
                },
            )
            .await
            .unwrap();
        assert!(first.created_thread);
        assert_eq!(first.recipients().collect::<Vec<_>>(), vec![bea.id]);

        let thread_id = first.message.conversation.id();
        let reply = service
            .post_message(bea.id, "hi back", MessageTarget::Thread(thread_id))
            .await
            .unwrap();
        assert!(!reply.created_thread);

        let views = service
            .list_messages(Conversation::Thread(thread_id), ada.id)
            .await
            .unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].message, "hello");
        assert!(views[0].author.is_me);
        assert!(!views[1].author.is_me);
        assert_eq!(views[1].author.name, "Bea");
    }

    #[tokio::test]
    async fn test_outsider_cannot_post_or_read() {
        let (service, ada, bea) = setup().await;
        let posted = service
            .post_message(
                ada.id,
                "private",
                MessageTarget::NewThread {
                    recipients: vec![bea.id],
                },
            )
            .await
            .unwrap();
        let thread_id = posted.message.conversation.id();
        let outsider = Uuid::new_v4();

        let post = service
            .post_message(outsider, "let me in", MessageTarget::Thread(thread_id))
            .await;
        assert!(matches!(post, Err(AppError::Forbidden(_))));

        let read = service
            .list_messages(Conversation::Thread(thread_id), outsider)
            .await;
        assert!(matches!(read, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_unknown_targets_not_found() {
        let (service, ada, _) = setup().await;
        let missing = Uuid::new_v4();

        let post = service
            .post_message(ada.id, "hello?", MessageTarget::Transaction(missing))
            .await;
        assert!(matches!(post, Err(AppError::NotFound(_))));

        let list = service
            .list_messages(Conversation::Thread(missing), ada.id)
            .await;
        assert!(matches!(list, Err(AppError::NotFound(_))));

        let new_thread = service
            .post_message(
                ada.id,
                "hello?",
                MessageTarget::NewThread {
                    recipients: vec![missing],
                },
            )
            .await;
        assert!(matches!(new_thread, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_first_message_leaves_no_thread() {
        let store = Arc::new(InMemoryStore::new());
        let ada = User::new("ada@example.com", "Ada");
        let bea = User::new("bea@example.com", "Bea");
        store.insert_user(ada.clone()).await;
        store.insert_user(bea.clone()).await;

        let mut repos = Repositories::in_memory(store.clone());
        repos.messages = Arc::new(FailingMessages);
        let service = MessageService::new(repos);

        let result = service
            .post_message(
                ada.id,
                "hi",
                MessageTarget::NewThread {
                    recipients: vec![bea.id],
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(store.thread_count().await, 0);
    }
}
