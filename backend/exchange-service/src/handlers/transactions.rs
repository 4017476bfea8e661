/// Transaction lifecycle handlers
use crate::error::{ApiResponse, AppError, Result};
use crate::handlers::{identity::AuthUser, reviews};
use crate::models::{Conversation, GeoPoint, RequestType, ScheduleUpdate, ScheduledLocation};
use crate::services::ProposeRequest;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ProposePayload {
    pub participant: Option<Uuid>,
    pub service: Option<Uuid>,
    pub request_type: RequestType,
    #[validate(length(max = 5000))]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AcceptPayload {
    #[validate(length(max = 5000))]
    pub message: Option<String>,
}

impl AcceptPayload {
    /// The body is optional; a blank one means no message, anything else
    /// must be valid JSON.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SchedulePayload {
    /// Epoch milliseconds
    pub date: Option<i64>,
    pub location: Option<LocationPayload>,
}

impl SchedulePayload {
    pub fn into_update(self) -> Result<ScheduleUpdate> {
        let happened_at = self
            .date
            .map(|ms| {
                DateTime::<Utc>::from_timestamp_millis(ms)
                    .ok_or_else(|| AppError::Validation(format!("invalid date: {ms}")))
            })
            .transpose()?;

        let location = self
            .location
            .map(|loc| {
                Ok::<_, AppError>(ScheduledLocation {
                    point: GeoPoint::new(loc.longitude, loc.latitude)?,
                    place_name: loc.name,
                })
            })
            .transpose()?;

        Ok(ScheduleUpdate {
            happened_at,
            location,
        })
    }
}

#[derive(Debug, Serialize)]
struct TransitionResponse {
    id: Uuid,
    #[serde(flatten)]
    outcome: crate::services::TransitionOutcome,
}

/// GET /api/v1/transactions
pub async fn list_transactions(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse> {
    let board = state.transactions.list_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(board)))
}

/// POST /api/v1/transactions
pub async fn propose(
    state: web::Data<AppState>,
    user: AuthUser,
    payload: web::Json<ProposePayload>,
) -> Result<HttpResponse> {
    payload.validate()?;
    let payload = payload.into_inner();

    let tx = state
        .transactions
        .propose(
            &user,
            ProposeRequest {
                participant: payload.participant,
                service_id: payload.service,
                request_type: payload.request_type,
                message: payload.message,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(tx)))
}

/// GET /api/v1/transactions/{id}
pub async fn get_transaction(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let tx = state.transactions.get(path.into_inner(), user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(tx)))
}

/// POST /api/v1/transactions/{id}/accept
pub async fn accept(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let payload = AcceptPayload::from_body(&body)?;
    payload.validate()?;

    let id = path.into_inner();
    let outcome = state.transactions.accept(id, &user, payload.message).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(TransitionResponse { id, outcome })))
}

/// POST /api/v1/transactions/{id}/reject
pub async fn reject(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let outcome = state.transactions.reject(id, &user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(TransitionResponse { id, outcome })))
}

/// POST /api/v1/transactions/{id}/cancel
pub async fn cancel(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let outcome = state.transactions.cancel(id, &user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(TransitionResponse { id, outcome })))
}

/// POST /api/v1/transactions/{id}/confirm
pub async fn confirm(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let outcome = state.transactions.confirm_exchange(id, &user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(TransitionResponse { id, outcome })))
}

/// PUT /api/v1/transactions/{id}/schedule
pub async fn schedule(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    payload: web::Json<SchedulePayload>,
) -> Result<HttpResponse> {
    let update = payload.into_inner().into_update()?;
    let tx = state
        .transactions
        .schedule(path.into_inner(), &user, update)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(tx)))
}

/// GET /api/v1/transactions/{id}/messages
pub async fn list_messages(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let views = state
        .messages
        .list_messages(Conversation::Transaction(path.into_inner()), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(views)))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/transactions")
            .route("", web::get().to(list_transactions))
            .route("", web::post().to(propose))
            .route("/{id}", web::get().to(get_transaction))
            .route("/{id}/accept", web::post().to(accept))
            .route("/{id}/reject", web::post().to(reject))
            .route("/{id}/cancel", web::post().to(cancel))
            .route("/{id}/confirm", web::post().to(confirm))
            .route("/{id}/schedule", web::put().to(schedule))
            .route("/{id}/messages", web::get().to(list_messages))
            .configure(reviews::register_routes),
    );
}
