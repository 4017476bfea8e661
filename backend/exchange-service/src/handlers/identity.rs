use crate::error::{AppError, Result};
use crate::models::User;
use crate::state::AppState;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use uuid::Uuid;

/// Header set by the upstream gateway after it authenticated the caller
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, loaded from the user store
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn into_inner(self) -> User {
        self.0
    }
}

impl std::ops::Deref for AuthUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

fn extract_user_id(req: &HttpRequest) -> Result<Uuid> {
    let header_value = req
        .headers()
        .get(USER_ID_HEADER)
        .ok_or(AppError::Unauthorized)?;

    let value = header_value.to_str().map_err(|_| AppError::Unauthorized)?;

    Uuid::parse_str(value.trim()).map_err(|_| AppError::Unauthorized)
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let user_id = extract_user_id(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let user_id = user_id?;
            let state = state.ok_or_else(|| AppError::Internal("app state missing".into()))?;

            match state.repos.users.find_by_id(user_id).await? {
                Some(user) => Ok(AuthUser(user)),
                None => {
                    tracing::debug!(%user_id, "unknown user on authenticated request");
                    Err(AppError::Unauthorized)
                }
            }
        })
    }
}
