pub mod manager;
pub mod messages;
pub mod session;

pub use manager::{ConnectionId, ConnectionRegistry, EventSender};
pub use messages::{WsInboundEvent, WsOutboundEvent};
pub use session::WsSession;
