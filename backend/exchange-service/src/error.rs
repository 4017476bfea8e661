use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Storage, email and connection hiccups. Callers running side effects
    /// swallow these; primary writes surface them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Notification(_) | AppError::Transport(_)
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Database(_) | AppError::Notification(_) | AppError::Transport(_) => 503,
            _ => 500,
        }
    }

    /// Message safe to hand back to a client. Server-side failures are reported
    /// generically; the detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(_)
            | AppError::NotFound(_)
            | AppError::Forbidden(_)
            | AppError::Unauthorized => self.to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if AppError::status_code(self) >= 500 {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(ResponseError::status_code(self))
            .json(ApiResponse::<()>::err(self.public_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized.status_code(), 401);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::Database("x".into()).status_code(), 503);
        assert_eq!(AppError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Database("timeout".into()).is_transient());
        assert!(AppError::Notification("smtp".into()).is_transient());
        assert!(!AppError::Validation("missing".into()).is_transient());
        assert!(!AppError::Forbidden("nope".into()).is_transient());
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = AppError::Database("connection refused to 10.0.0.3".into());
        assert_eq!(err.public_message(), "internal server error");

        let err = AppError::Validation("service is required".into());
        assert_eq!(err.public_message(), "validation error: service is required");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
