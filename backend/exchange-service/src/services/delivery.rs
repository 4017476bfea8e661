//! # Delivery Coordinator
//!
//! Turns a persisted message or transaction change into participant side
//! effects: live push to connected users, an email notification, and the
//! unread mark. Each recipient is handled in isolation; one recipient's
//! failure is logged and never reaches the caller or the other recipients.

use crate::error::Result;
use crate::metrics;
use crate::models::{Conversation, MessageTarget, PostedMessage, Transaction, User};
use crate::repository::Repositories;
use crate::services::email::{NotificationContext, NotificationKind, Notifier};
use crate::services::message_service::{to_view, MessageService};
use crate::websocket::{ConnectionId, ConnectionRegistry, EventSender, WsOutboundEvent};
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

/// What happened for one recipient of a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantDelivery {
    pub user_id: Uuid,
    pub pushed: bool,
    pub emailed: bool,
    pub unread_marked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub deliveries: Vec<ParticipantDelivery>,
}

impl FanOutReport {
    pub fn for_user(&self, user_id: Uuid) -> Option<&ParticipantDelivery> {
        self.deliveries.iter().find(|d| d.user_id == user_id)
    }
}

pub struct DeliveryCoordinator {
    messages: MessageService,
    repos: Repositories,
    registry: ConnectionRegistry,
    notifier: Arc<dyn Notifier>,
}

impl DeliveryCoordinator {
    pub fn new(
        messages: MessageService,
        repos: Repositories,
        registry: ConnectionRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            messages,
            repos,
            registry,
            notifier,
        }
    }

    /// Register a live connection and greet it with the current unread count
    pub async fn connect(&self, user: &User, sender: EventSender) -> ConnectionId {
        let connection_id = self.registry.register(user.id, sender).await;
        metrics::set_ws_connections(self.registry.connected_users_count().await);

        self.registry
            .send(user.id, WsOutboundEvent::connected(user.id))
            .await;
        self.registry
            .send(
                user.id,
                WsOutboundEvent::UnreadCount {
                    count: user.unread_threads.len(),
                },
            )
            .await;

        tracing::info!(user_id = %user.id, "live connection registered");
        connection_id
    }

    pub async fn disconnect(&self, user_id: Uuid, connection_id: ConnectionId) {
        if self.registry.unregister(user_id, connection_id).await {
            tracing::info!(%user_id, "live connection closed");
        }
        metrics::set_ws_connections(self.registry.connected_users_count().await);
    }

    /// Inbound chat event: persist, then fan out. Only the write can fail.
    pub async fn handle_chat_event(
        &self,
        sender: &User,
        body: &str,
        target: MessageTarget,
    ) -> Result<PostedMessage> {
        let posted = self.messages.post_message(sender.id, body, target).await?;
        self.fan_out(sender, &posted).await;
        Ok(posted)
    }

    /// Per-recipient delivery of an already persisted message. The sender is skipped.
    pub async fn fan_out(&self, sender: &User, posted: &PostedMessage) -> FanOutReport {
        let deliveries = join_all(
            posted
                .recipients()
                .map(|recipient_id| self.deliver_message(sender, posted, recipient_id)),
        )
        .await;

        FanOutReport { deliveries }
    }

    async fn deliver_message(
        &self,
        sender: &User,
        posted: &PostedMessage,
        recipient_id: Uuid,
    ) -> ParticipantDelivery {
        let conversation = posted.message.conversation;

        let pushed = self
            .registry
            .send(
                recipient_id,
                WsOutboundEvent::NewMessage {
                    conversation,
                    message: to_view(posted.message.clone(), Some(sender), recipient_id),
                },
            )
            .await;

        let unread_marked = self.mark_unread(recipient_id, conversation).await;

        let context = NotificationContext {
            sender_name: sender.profile.name.clone(),
            message_preview: Some(posted.message.body.clone()),
            transaction_id: match conversation {
                Conversation::Transaction(id) => Some(id),
                Conversation::Thread(_) => None,
            },
        };
        let emailed = self
            .email(recipient_id, NotificationKind::NewMessage, &context)
            .await;

        ParticipantDelivery {
            user_id: recipient_id,
            pushed,
            emailed,
            unread_marked,
        }
    }

    async fn mark_unread(&self, user_id: Uuid, conversation: Conversation) -> bool {
        match self.repos.users.add_unread(user_id, conversation.id()).await {
            Ok(count) => {
                self.registry
                    .send(user_id, WsOutboundEvent::UnreadCount { count })
                    .await;
                true
            }
            Err(e) => {
                metrics::record_fanout_failure("unread");
                tracing::warn!(
                    %user_id,
                    conversation_id = %conversation.id(),
                    error = %e,
                    "failed to mark conversation unread"
                );
                false
            }
        }
    }

    async fn email(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> bool {
        let recipient = match self.repos.users.find_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                metrics::record_fanout_failure("email");
                tracing::warn!(%user_id, kind = kind.as_str(), "notification recipient not found");
                return false;
            }
            Err(e) => {
                metrics::record_fanout_failure("email");
                tracing::warn!(%user_id, error = %e, "failed to load notification recipient");
                return false;
            }
        };

        match self.notifier.notify(&recipient, kind, context).await {
            Ok(()) => true,
            Err(e) => {
                metrics::record_fanout_failure("email");
                tracing::error!(
                    %user_id,
                    kind = kind.as_str(),
                    error = %e,
                    "failed to send notification"
                );
                false
            }
        }
    }

    /// Push the new transaction state to the actor's counterpart, if online
    pub async fn notify_transaction_update(&self, actor_id: Uuid, tx: &Transaction) -> bool {
        let Some(counterpart) = tx.counterpart_of(actor_id) else {
            return false;
        };
        self.registry
            .send(
                counterpart,
                WsOutboundEvent::TransactionUpdated {
                    transaction: tx.clone(),
                },
            )
            .await
    }

    /// Schedule change: email every other participant and push the new state
    pub async fn notify_schedule_update(&self, actor: &User, tx: &Transaction) {
        let context = NotificationContext {
            sender_name: actor.profile.name.clone(),
            message_preview: None,
            transaction_id: Some(tx.id),
        };

        let others = tx.participants.iter().copied().filter(|id| *id != actor.id);
        join_all(others.map(|user_id| {
            let context = &context;
            async move {
                self.email(user_id, NotificationKind::ScheduleUpdated, context)
                    .await
            }
        }))
        .await;

        self.notify_transaction_update(actor.id, tx).await;
    }
}
