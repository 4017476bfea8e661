use crate::error::{ApiResponse, Result};
use crate::handlers::identity::AuthUser;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewPayload {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[serde(default, alias = "message")]
    #[validate(length(max = 2000))]
    pub text: String,
}

/// GET /api/v1/transactions/{id}/reviews
pub async fn get_review(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let view = state.reviews.get_review_view(path.into_inner(), &user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(view)))
}

/// POST /api/v1/transactions/{id}/reviews
pub async fn submit_review(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    payload: web::Json<ReviewPayload>,
) -> Result<HttpResponse> {
    payload.validate()?;
    let payload = payload.into_inner();

    let review = state
        .reviews
        .submit_review(path.into_inner(), &user, payload.rating, payload.text)
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(review)))
}

/// Mounted inside the `/api/v1/transactions` scope
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/{id}/reviews", web::get().to(get_review))
        .route("/{id}/reviews", web::post().to(submit_review));
}
