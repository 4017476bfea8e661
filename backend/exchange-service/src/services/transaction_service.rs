//! # Transaction Service
//!
//! The exchange state machine:
//!
//! ```text
//! PROPOSED ──accept──▶ ACCEPTED ──confirm──▶ SENDER_ACK | RECIPIENT_ACK ──confirm──▶ COMPLETE
//!    │                    │
//!    ├──reject──▶ REJECTED
//!    └──cancel────────────┴──▶ CANCELLED
//! ```
//!
//! Every transition is a compare-and-set on the stored status. A transition
//! whose precondition no longer holds matches nothing and is reported as
//! `TransitionOutcome::NotApplicable` with the re-read status, never as an
//! error. Status is never cached between requests.

use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    MessageTarget, RequestType, Role, ScheduleUpdate, Transaction, TransactionStatus, User,
    UserSummary,
};
use crate::repository::{ActorGuard, Repositories, StatusUpdate};
use crate::services::delivery::DeliveryCoordinator;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProposeRequest {
    pub participant: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub request_type: RequestType,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied { status: TransactionStatus },
    /// Precondition did not hold; nothing was written
    NotApplicable { status: TransactionStatus },
}

impl TransitionOutcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            TransitionOutcome::Applied { status } | TransitionOutcome::NotApplicable { status } => {
                *status
            }
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransactionSummary {
    pub transaction: Transaction,
    pub other_party: Option<UserSummary>,
}

/// A user's exchanges grouped the way the board shows them
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TransactionBoard {
    pub proposed: Vec<TransactionSummary>,
    pub upcoming: Vec<TransactionSummary>,
    pub complete: Vec<TransactionSummary>,
}

pub struct TransactionService {
    repos: Repositories,
    delivery: Arc<DeliveryCoordinator>,
}

impl TransactionService {
    pub fn new(repos: Repositories, delivery: Arc<DeliveryCoordinator>) -> Self {
        Self { repos, delivery }
    }

    async fn load(&self, id: Uuid) -> Result<Transaction> {
        self.repos
            .transactions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {id}")))
    }

    fn role_of(tx: &Transaction, user_id: Uuid) -> Result<Role> {
        tx.role_of(user_id).ok_or_else(|| {
            AppError::Forbidden(format!("user {user_id} is not part of transaction {}", tx.id))
        })
    }

    /// Runs the updates and re-reads the authoritative status
    async fn transition(
        &self,
        operation: &'static str,
        actor_id: Uuid,
        tx_id: Uuid,
        updates: &[StatusUpdate],
    ) -> Result<(TransitionOutcome, Transaction)> {
        let outcome = self.repos.transactions.apply_status_updates(updates).await?;
        let current = self.load(tx_id).await?;
        let applied = outcome.matched > 0;

        metrics::record_transition(operation, applied);

        let result = if applied {
            tracing::info!(
                transaction_id = %tx_id,
                %actor_id,
                operation,
                status = %current.status,
                "transaction transition applied"
            );
            self.delivery.notify_transaction_update(actor_id, &current).await;
            TransitionOutcome::Applied {
                status: current.status,
            }
        } else {
            tracing::debug!(
                transaction_id = %tx_id,
                %actor_id,
                operation,
                status = %current.status,
                "transition not applicable"
            );
            TransitionOutcome::NotApplicable {
                status: current.status,
            }
        };

        Ok((result, current))
    }

    /// Sends `body` on the transaction through the normal persist-then-fan-out path.
    /// The transition already happened, so a failure here is only logged.
    async fn attach_message(&self, author: &User, tx_id: Uuid, body: Option<&str>) {
        let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
            return;
        };
        if let Err(e) = self
            .delivery
            .handle_chat_event(author, body, MessageTarget::Transaction(tx_id))
            .await
        {
            tracing::warn!(transaction_id = %tx_id, error = %e, "failed to attach message");
        }
    }

    pub async fn propose(&self, creator: &User, request: ProposeRequest) -> Result<Transaction> {
        let participant = request
            .participant
            .ok_or_else(|| AppError::Validation("participant is required".into()))?;
        let service_id = request
            .service_id
            .ok_or_else(|| AppError::Validation("service is required".into()))?;

        let tx = Transaction::propose(creator.id, participant, service_id, request.request_type)?;

        if self.repos.users.find_by_id(participant).await?.is_none() {
            return Err(AppError::NotFound(format!("user {participant}")));
        }

        self.repos.transactions.insert(&tx).await?;
        metrics::record_transition("propose", true);
        tracing::info!(
            transaction_id = %tx.id,
            creator_id = %creator.id,
            participant_id = %participant,
            request_type = tx.request_type.as_str(),
            "transaction proposed"
        );

        self.delivery.notify_transaction_update(creator.id, &tx).await;
        self.attach_message(creator, tx.id, request.message.as_deref())
            .await;

        Ok(tx)
    }

    pub async fn accept(
        &self,
        id: Uuid,
        accepter: &User,
        message: Option<String>,
    ) -> Result<TransitionOutcome> {
        let tx = self.load(id).await?;
        if Self::role_of(&tx, accepter.id)? == Role::Creator {
            return Err(AppError::Forbidden(
                "the creator cannot accept their own proposal".into(),
            ));
        }

        let update = StatusUpdate::new(id, &[TransactionStatus::Proposed], TransactionStatus::Accepted)
            .guarded(ActorGuard::Participant(accepter.id));
        let (outcome, _) = self.transition("accept", accepter.id, id, &[update]).await?;

        if outcome.is_applied() {
            self.attach_message(accepter, id, message.as_deref()).await;
        }
        Ok(outcome)
    }

    pub async fn reject(&self, id: Uuid, requester: &User) -> Result<TransitionOutcome> {
        let tx = self.load(id).await?;
        Self::role_of(&tx, requester.id)?;

        let update = StatusUpdate::new(id, &[TransactionStatus::Proposed], TransactionStatus::Rejected)
            .guarded(ActorGuard::Participant(requester.id));
        let (outcome, _) = self.transition("reject", requester.id, id, &[update]).await?;
        Ok(outcome)
    }

    pub async fn cancel(&self, id: Uuid, requester: &User) -> Result<TransitionOutcome> {
        let tx = self.load(id).await?;
        if Self::role_of(&tx, requester.id)? != Role::Creator {
            return Err(AppError::Forbidden(
                "only the creator can cancel a transaction".into(),
            ));
        }

        let update = StatusUpdate::new(
            id,
            &[TransactionStatus::Proposed, TransactionStatus::Accepted],
            TransactionStatus::Cancelled,
        )
        .guarded(ActorGuard::Creator(requester.id));
        let (outcome, _) = self.transition("cancel", requester.id, id, &[update]).await?;
        Ok(outcome)
    }

    /// Acknowledge that the exchange happened.
    ///
    /// Issued as two independent conditional updates: first ACCEPTED → my ACK,
    /// then partner's ACK → COMPLETE. If both parties confirm at the same time,
    /// at least one of them runs its completion update after the other's ACK
    /// has landed, so the transaction reaches COMPLETE exactly once.
    pub async fn confirm_exchange(&self, id: Uuid, requester: &User) -> Result<TransitionOutcome> {
        let tx = self.load(id).await?;
        let role = Self::role_of(&tx, requester.id)?;
        let guard = ActorGuard::Participant(requester.id);

        let updates = [
            StatusUpdate::new(id, &[TransactionStatus::Accepted], role.ack_status())
                .guarded(guard),
            StatusUpdate::new(
                id,
                &[role.counterpart().ack_status()],
                TransactionStatus::Complete,
            )
            .guarded(guard),
        ];
        let (outcome, _) = self.transition("confirm", requester.id, id, &updates).await?;
        Ok(outcome)
    }

    /// Update time and/or place. Status is untouched; closed exchanges
    /// (complete, rejected, cancelled) can no longer be rescheduled.
    pub async fn schedule(
        &self,
        id: Uuid,
        requester: &User,
        update: ScheduleUpdate,
    ) -> Result<Transaction> {
        if update.is_empty() {
            return Err(AppError::Validation(
                "schedule needs a time or a location".into(),
            ));
        }

        let tx = self.load(id).await?;
        Self::role_of(&tx, requester.id)?;
        if tx.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "cannot schedule a {} transaction",
                tx.status
            )));
        }

        let updated = self
            .repos
            .transactions
            .update_schedule(id, requester.id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {id}")))?;

        tracing::info!(
            transaction_id = %id,
            actor_id = %requester.id,
            has_time = update.happened_at.is_some(),
            has_location = update.location.is_some(),
            "transaction schedule updated"
        );

        self.delivery.notify_schedule_update(requester, &updated).await;
        Ok(updated)
    }

    pub async fn get(&self, id: Uuid, viewer_id: Uuid) -> Result<Transaction> {
        let tx = self.load(id).await?;
        Self::role_of(&tx, viewer_id)?;
        Ok(tx)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<TransactionBoard> {
        let transactions = self
            .repos
            .transactions
            .find_for_participant(user_id, &TransactionStatus::VISIBLE)
            .await?;

        let mut others: Vec<Uuid> = transactions
            .iter()
            .filter_map(|tx| tx.counterpart_of(user_id))
            .collect();
        others.sort();
        others.dedup();
        let profiles: HashMap<Uuid, UserSummary> = self
            .repos
            .users
            .find_many(&others)
            .await?
            .into_iter()
            .map(|u| (u.id, u.summary()))
            .collect();

        let mut board = TransactionBoard::default();
        for tx in transactions {
            let other_party = tx
                .counterpart_of(user_id)
                .and_then(|id| profiles.get(&id).cloned());
            let status = tx.status;
            let summary = TransactionSummary {
                transaction: tx,
                other_party,
            };
            match status {
                TransactionStatus::Proposed => board.proposed.push(summary),
                TransactionStatus::Accepted => board.upcoming.push(summary),
                _ => board.complete.push(summary),
            }
        }
        Ok(board)
    }
}
