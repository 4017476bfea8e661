use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub creator_id: Uuid,
    pub rating: i16,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        transaction_id: Uuid,
        creator_id: Uuid,
        rating: i16,
        text: String,
    ) -> Result<Self, AppError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(AppError::Validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            transaction_id,
            creator_id,
            rating,
            text,
            sent_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewAuthor {
    pub id: Uuid,
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartnerReview {
    pub author: ReviewAuthor,
    pub text: String,
    pub rating: i16,
    pub sent_at: DateTime<Utc>,
}

/// Mutual-blind reveal: the partner's review only shows once the viewer wrote theirs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewView {
    NoOwnReview,
    OwnReviewButNoPartnerReview,
    PartnerReview(PartnerReview),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        let tx = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert!(Review::new(tx, user, 1, "ok".into()).is_ok());
        assert!(Review::new(tx, user, 5, "great".into()).is_ok());
        assert!(matches!(
            Review::new(tx, user, 0, "".into()),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            Review::new(tx, user, 6, "".into()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_view_tagging() {
        let json = serde_json::to_value(ReviewView::OwnReviewButNoPartnerReview).unwrap();
        assert_eq!(json["state"], "own_review_but_no_partner_review");
    }
}
