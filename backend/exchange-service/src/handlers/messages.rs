/// Chat handlers over HTTP. Sending goes through the delivery coordinator,
/// same as a WebSocket `send_message`.
use crate::error::{ApiResponse, Result};
use crate::handlers::identity::AuthUser;
use crate::models::{Conversation, MessageTarget};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct PostMessagePayload {
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<Uuid>,
    #[serde(default)]
    pub transaction_id: Option<Uuid>,
    #[serde(default)]
    pub is_new_thread: bool,
    #[serde(default)]
    pub to: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub message_id: Uuid,
    pub conversation: Conversation,
    pub created_thread: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub count: usize,
}

/// POST /api/v1/messages
pub async fn post_message(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<PostMessagePayload>,
) -> Result<HttpResponse> {
    payload.validate()?;
    let payload = payload.into_inner();

    let target = MessageTarget::from_parts(
        payload.thread_id,
        payload.transaction_id,
        payload.is_new_thread,
        payload.to,
    )?;
    let posted = state
        .delivery
        .handle_chat_event(&user, &payload.message, target)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(PostMessageResponse {
        message_id: posted.message.id,
        conversation: posted.message.conversation,
        created_thread: posted.created_thread,
    })))
}

/// GET /api/v1/threads/{id}/messages
pub async fn list_thread_messages(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let views = state
        .messages
        .list_messages(Conversation::Thread(path.into_inner()), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(views)))
}

/// GET /api/v1/unread
pub async fn unread_count(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse> {
    let count = state.messages.unread_count(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(UnreadResponse { count })))
}

/// POST /api/v1/threads/{id}/ack
///
/// `id` is any conversation id (thread or transaction).
pub async fn acknowledge(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let count = state
        .messages
        .acknowledge(user.id, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(UnreadResponse { count })))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/messages", web::post().to(post_message))
        .route("/api/v1/unread", web::get().to(unread_count))
        .service(
            web::scope("/api/v1/threads")
                .route("/{id}/messages", web::get().to(list_thread_messages))
                .route("/{id}/ack", web::post().to(acknowledge)),
        );
}
