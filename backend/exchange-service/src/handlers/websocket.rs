use crate::handlers::identity::AuthUser;
use crate::state::AppState;
use crate::websocket::WsSession;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::mpsc;

/// GET /ws
///
/// Registers the caller with the delivery coordinator, then upgrades. A
/// failed handshake releases the registration again.
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, Error> {
    let user = user.into_inner();
    let user_id = user.id;

    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = state.delivery.connect(&user, tx).await;

    let session = WsSession::new(user, connection_id, state.delivery.clone(), rx);
    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "WebSocket handshake failed");
            state.delivery.disconnect(user_id, connection_id).await;
            Err(e)
        }
    }
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_handler));
}
