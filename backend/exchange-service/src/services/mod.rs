pub mod delivery;
pub mod email;
pub mod message_service;
pub mod review_service;
pub mod transaction_service;

pub use delivery::{DeliveryCoordinator, FanOutReport, ParticipantDelivery};
pub use email::{EmailNotifier, NotificationContext, NotificationKind, Notifier};
pub use message_service::MessageService;
pub use review_service::ReviewService;
pub use transaction_service::{
    ProposeRequest, TransactionBoard, TransactionService, TransactionSummary, TransitionOutcome,
};
