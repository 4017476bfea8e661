/// HTTP and WebSocket handlers for the exchange service API
pub mod identity;
pub mod messages;
pub mod reviews;
pub mod transactions;
pub mod websocket;

use actix_web::web;

pub use identity::AuthUser;

/// Every API route; health and metrics are mounted by the binary
pub fn configure(cfg: &mut web::ServiceConfig) {
    transactions::register_routes(cfg);
    messages::register_routes(cfg);
    websocket::register_routes(cfg);
}
