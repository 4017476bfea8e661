use super::{ConnectionId, WsInboundEvent, WsOutboundEvent};
use crate::error::AppError;
use crate::models::{MessageTarget, User};
use crate::services::DeliveryCoordinator;
use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One live connection. Already registered with the delivery coordinator
/// when the actor starts; `outbound` carries everything pushed to this user.
pub struct WsSession {
    user: User,
    connection_id: ConnectionId,
    delivery: Arc<DeliveryCoordinator>,
    outbound: Option<mpsc::UnboundedReceiver<WsOutboundEvent>>,
    hb: Instant,
}

impl WsSession {
    pub fn new(
        user: User,
        connection_id: ConnectionId,
        delivery: Arc<DeliveryCoordinator>,
        outbound: mpsc::UnboundedReceiver<WsOutboundEvent>,
    ) -> Self {
        Self {
            user,
            connection_id,
            delivery,
            outbound: Some(outbound),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = %act.user.id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn push(&self, event: &WsOutboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event.to_json() {
            Ok(text) => ctx.text(text),
            Err(e) => tracing::error!(error = %e, "failed to encode outbound event"),
        }
    }

    fn handle_inbound(&mut self, event: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event {
            WsInboundEvent::Ping { timestamp } => {
                self.push(&WsOutboundEvent::pong(timestamp), ctx);
            }
            WsInboundEvent::SendMessage {
                message,
                thread_id,
                transaction_id,
                is_new_thread,
                to,
            } => {
                let target =
                    match MessageTarget::from_parts(thread_id, transaction_id, is_new_thread, to) {
                        Ok(target) => target,
                        Err(e) => {
                            self.push(&error_event(&e), ctx);
                            return;
                        }
                    };

                let delivery = self.delivery.clone();
                let sender = self.user.clone();
                let work = async move { delivery.handle_chat_event(&sender, &message, target).await };

                ctx.spawn(work.into_actor(self).map(|result, act, ctx| {
                    let reply = match result {
                        Ok(posted) => WsOutboundEvent::MessageAccepted {
                            message_id: posted.message.id,
                            conversation: posted.message.conversation,
                        },
                        Err(e) => {
                            tracing::warn!(user_id = %act.user.id, error = %e, "send_message failed");
                            error_event(&e)
                        }
                    };
                    act.push(&reply, ctx);
                }));
            }
        }
    }
}

fn error_event(error: &AppError) -> WsOutboundEvent {
    let code = match error {
        AppError::Validation(_) => "validation",
        AppError::NotFound(_) => "not_found",
        AppError::Forbidden(_) | AppError::Unauthorized => "forbidden",
        _ => "internal",
    };
    WsOutboundEvent::error(code, error.public_message())
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user.id, "WebSocket session started");
        self.hb(ctx);

        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbound));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user.id, "WebSocket session stopped");

        let delivery = self.delivery.clone();
        let user_id = self.user.id;
        let connection_id = self.connection_id;
        actix::spawn(async move {
            delivery.disconnect(user_id, connection_id).await;
        });
    }
}

// Events pushed to this user through the registry
impl StreamHandler<WsOutboundEvent> for WsSession {
    fn handle(&mut self, event: WsOutboundEvent, ctx: &mut Self::Context) {
        self.push(&event, ctx);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Channel closes when a newer connection replaced this one
        tracing::info!(user_id = %self.user.id, "outbound channel closed, ending session");
        ctx.stop();
    }
}

// Handle WebSocket protocol messages
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match WsInboundEvent::from_json(&text) {
                    Ok(event) => self.handle_inbound(event, ctx),
                    Err(e) => {
                        tracing::warn!(user_id = %self.user.id, error = %e, "failed to parse WS message");
                        self.push(&WsOutboundEvent::error("bad_request", e.to_string()), ctx);
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(user_id = %self.user.id, ?reason, "WebSocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user.id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
