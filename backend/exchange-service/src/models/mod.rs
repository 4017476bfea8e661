pub mod message;
pub mod review;
pub mod transaction;
pub mod user;

pub use message::{
    AuthorView, Conversation, Message, MessageTarget, MessageView, PostedMessage, Thread,
};
pub use review::{PartnerReview, Review, ReviewAuthor, ReviewView};
pub use transaction::{
    GeoPoint, RequestType, Role, ScheduleUpdate, ScheduledLocation, Transaction,
    TransactionStatus,
};
pub use user::{Profile, User, UserSummary};
