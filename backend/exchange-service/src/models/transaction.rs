use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Lifecycle status of an exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Proposed,
    Accepted,
    /// Creator confirmed the exchange happened
    SenderAck,
    /// Non-creator participant confirmed the exchange happened
    RecipientAck,
    Complete,
    Rejected,
    Cancelled,
}

impl TransactionStatus {
    /// Statuses shown on a user's transaction board
    pub const VISIBLE: [TransactionStatus; 5] = [
        TransactionStatus::Proposed,
        TransactionStatus::Accepted,
        TransactionStatus::RecipientAck,
        TransactionStatus::SenderAck,
        TransactionStatus::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Proposed => "PROPOSED",
            TransactionStatus::Accepted => "ACCEPTED",
            TransactionStatus::SenderAck => "SENDER_ACK",
            TransactionStatus::RecipientAck => "RECIPIENT_ACK",
            TransactionStatus::Complete => "COMPLETE",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Complete | TransactionStatus::Rejected | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROPOSED" => Ok(TransactionStatus::Proposed),
            "ACCEPTED" => Ok(TransactionStatus::Accepted),
            "SENDER_ACK" => Ok(TransactionStatus::SenderAck),
            "RECIPIENT_ACK" => Ok(TransactionStatus::RecipientAck),
            "COMPLETE" => Ok(TransactionStatus::Complete),
            "REJECTED" => Ok(TransactionStatus::Rejected),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            other => Err(AppError::Database(format!("unknown transaction status {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// Creator offers the service
    Offer,
    /// Creator asks for the service
    Request,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Offer => "OFFER",
            RequestType::Request => "REQUEST",
        }
    }
}

impl FromStr for RequestType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFER" => Ok(RequestType::Offer),
            "REQUEST" => Ok(RequestType::Request),
            other => Err(AppError::Database(format!("unknown request type {other}"))),
        }
    }
}

/// A participant's side of the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Creator,
    Recipient,
}

impl Role {
    /// Status reached when this side acknowledges first
    pub fn ack_status(&self) -> TransactionStatus {
        match self {
            Role::Creator => TransactionStatus::SenderAck,
            Role::Recipient => TransactionStatus::RecipientAck,
        }
    }

    pub fn counterpart(&self) -> Role {
        match self {
            Role::Creator => Role::Recipient,
            Role::Recipient => Role::Creator,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, AppError> {
        if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::Validation(format!(
                "coordinates out of range: ({longitude}, {latitude})"
            )));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledLocation {
    pub point: GeoPoint,
    pub place_name: String,
}

/// Fields a participant may change without touching status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleUpdate {
    pub happened_at: Option<DateTime<Utc>>,
    pub location: Option<ScheduledLocation>,
}

impl ScheduleUpdate {
    pub fn is_empty(&self) -> bool {
        self.happened_at.is_none() && self.location.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub creator_id: Uuid,
    /// Always two distinct users: `[recipient, creator]`
    pub participants: Vec<Uuid>,
    pub service_id: Uuid,
    pub request_type: RequestType,
    pub status: TransactionStatus,
    pub happened_at: Option<DateTime<Utc>>,
    pub location: Option<ScheduledLocation>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// New exchange in PROPOSED between `creator` and `recipient`
    pub fn propose(
        creator_id: Uuid,
        recipient_id: Uuid,
        service_id: Uuid,
        request_type: RequestType,
    ) -> Result<Self, AppError> {
        if creator_id == recipient_id {
            return Err(AppError::Validation(
                "cannot propose an exchange to yourself".into(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            creator_id,
            participants: vec![recipient_id, creator_id],
            service_id,
            request_type,
            status: TransactionStatus::Proposed,
            happened_at: None,
            location: None,
            created_at: Utc::now(),
        })
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        if user_id == self.creator_id {
            Some(Role::Creator)
        } else if self.is_participant(user_id) {
            Some(Role::Recipient)
        } else {
            None
        }
    }

    /// The other party, from `user_id`'s point of view
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if !self.is_participant(user_id) {
            return None;
        }
        self.participants.iter().copied().find(|id| *id != user_id)
    }

    pub fn apply_schedule(&mut self, update: &ScheduleUpdate) {
        if let Some(at) = update.happened_at {
            self.happened_at = Some(at);
        }
        if let Some(location) = &update.location {
            self.location = Some(location.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propose_orders_participants() {
        let creator = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let tx = Transaction::propose(creator, recipient, Uuid::new_v4(), RequestType::Offer)
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Proposed);
        assert_eq!(tx.participants, vec![recipient, creator]);
        assert_eq!(tx.role_of(creator), Some(Role::Creator));
        assert_eq!(tx.role_of(recipient), Some(Role::Recipient));
        assert_eq!(tx.role_of(Uuid::new_v4()), None);
        assert_eq!(tx.counterpart_of(creator), Some(recipient));
        assert_eq!(tx.counterpart_of(Uuid::new_v4()), None);
    }

    #[test]
    fn test_propose_to_self_rejected() {
        let user = Uuid::new_v4();
        let result = Transaction::propose(user, user, Uuid::new_v4(), RequestType::Request);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_ack_status_per_role() {
        assert_eq!(Role::Creator.ack_status(), TransactionStatus::SenderAck);
        assert_eq!(Role::Recipient.ack_status(), TransactionStatus::RecipientAck);
        assert_eq!(Role::Creator.counterpart(), Role::Recipient);
    }

    #[test]
    fn test_status_string_forms() {
        for status in [
            TransactionStatus::Proposed,
            TransactionStatus::Accepted,
            TransactionStatus::SenderAck,
            TransactionStatus::RecipientAck,
            TransactionStatus::Complete,
            TransactionStatus::Rejected,
            TransactionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        let json = serde_json::to_string(&TransactionStatus::RecipientAck).unwrap();
        assert_eq!(json, "\"RECIPIENT_ACK\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Complete.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
        assert!(!TransactionStatus::SenderAck.is_terminal());
    }

    #[test]
    fn test_geo_point_range() {
        assert!(GeoPoint::new(13.4, 52.5).is_ok());
        assert!(GeoPoint::new(200.0, 52.5).is_err());
        assert!(GeoPoint::new(13.4, -91.0).is_err());
    }

    #[test]
    fn test_apply_schedule_keeps_unset_fields() {
        let mut tx = Transaction::propose(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            RequestType::Offer,
        )
        .unwrap();
        let at = Utc::now();
        tx.apply_schedule(&ScheduleUpdate {
            happened_at: Some(at),
            location: None,
        });
        tx.apply_schedule(&ScheduleUpdate {
            happened_at: None,
            location: Some(ScheduledLocation {
                point: GeoPoint::new(2.35, 48.85).unwrap(),
                place_name: "Café".into(),
            }),
        });

        assert_eq!(tx.happened_at, Some(at));
        assert_eq!(tx.location.unwrap().place_name, "Café");
    }
}
