use crate::config::PolicyConfig;
use crate::error::{AppError, Result};
use crate::models::{PartnerReview, Review, ReviewAuthor, ReviewView, Transaction, TransactionStatus, User};
use crate::repository::Repositories;
use uuid::Uuid;

/// Reviews after an exchange, revealed mutually-blind
#[derive(Clone)]
pub struct ReviewService {
    repos: Repositories,
    policy: PolicyConfig,
}

impl ReviewService {
    pub fn new(repos: Repositories, policy: PolicyConfig) -> Self {
        Self { repos, policy }
    }

    async fn load_for(&self, transaction_id: Uuid, user_id: Uuid) -> Result<Transaction> {
        let tx = self
            .repos
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;

        if !tx.is_participant(user_id) {
            return Err(AppError::Forbidden(format!(
                "user {user_id} is not part of transaction {transaction_id}"
            )));
        }
        Ok(tx)
    }

    pub async fn submit_review(
        &self,
        transaction_id: Uuid,
        reviewer: &User,
        rating: i16,
        text: String,
    ) -> Result<Review> {
        let review = Review::new(transaction_id, reviewer.id, rating, text)?;
        let tx = self.load_for(transaction_id, reviewer.id).await?;

        if self.policy.review_requires_completion && tx.status != TransactionStatus::Complete {
            return Err(AppError::Validation(format!(
                "reviews open once the exchange is complete (status is {})",
                tx.status
            )));
        }

        if !self.repos.reviews.insert(&review).await? {
            return Err(AppError::Validation(
                "you already reviewed this exchange".into(),
            ));
        }

        tracing::info!(
            %transaction_id,
            reviewer_id = %reviewer.id,
            rating,
            "review submitted"
        );
        Ok(review)
    }

    /// The partner's review is only shown once the viewer has written their own
    pub async fn get_review_view(&self, transaction_id: Uuid, viewer: &User) -> Result<ReviewView> {
        self.load_for(transaction_id, viewer.id).await?;
        let reviews = self.repos.reviews.list_for_transaction(transaction_id).await?;

        if !reviews.iter().any(|r| r.creator_id == viewer.id) {
            return Ok(ReviewView::NoOwnReview);
        }
        let Some(partner) = reviews.into_iter().find(|r| r.creator_id != viewer.id) else {
            return Ok(ReviewView::OwnReviewButNoPartnerReview);
        };

        let author = match self.repos.users.find_by_id(partner.creator_id).await? {
            Some(user) => ReviewAuthor {
                id: user.id,
                name: user.profile.name,
                picture: user.profile.picture,
            },
            None => ReviewAuthor {
                id: partner.creator_id,
                name: "Unknown user".to_string(),
                picture: None,
            },
        };

        Ok(ReviewView::PartnerReview(PartnerReview {
            author,
            text: partner.text,
            rating: partner.rating,
            sent_at: partner.sent_at,
        }))
    }
}
