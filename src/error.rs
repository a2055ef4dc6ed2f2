use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Telegram error: {0}")]
    TelegramError(#[from] teloxide::RequestError),
}

impl AppError {
    /// Text safe to show in the chat. Internal failures collapse to a generic message.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ValidationError(msg) => format!("⚠️ {msg}"),
            AppError::NotFound(msg) => format!("🔍 {msg}"),
            AppError::Forbidden => "⛔ Недостаточно прав".to_string(),
            AppError::InsufficientBalance {
                required,
                available,
            } => format!(
                "💸 Недостаточно средств: нужно {}, на балансе {}",
                crate::utils::format_money(*required),
                crate::utils::format_money(*available)
            ),
            AppError::ExternalApiError(_) | AppError::ReqwestError(_) => {
                "🛠 Сервис VPN временно недоступен, попробуйте позже".to_string()
            }
            _ => "❌ Произошла ошибка, попробуйте позже".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code, message) = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                (
                    actix_web::http::StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    msg.clone(),
                )
            }
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
            ),
            AppError::Forbidden => {
                log::warn!("Forbidden access");
                (
                    actix_web::http::StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Forbidden".to_string(),
                )
            }
            AppError::ExternalApiError(msg) => {
                log::error!("External API error: {msg}");
                (
                    actix_web::http::StatusCode::BAD_GATEWAY,
                    "EXTERNAL_API_ERROR",
                    msg.clone(),
                )
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            _ => {
                log::error!("Internal error: {self}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_are_not_leaked_to_users() {
        let err = AppError::InternalError("pool exhausted at 10.0.0.3".into());
        assert!(!err.user_message().contains("10.0.0.3"));

        let err = AppError::ExternalApiError("401 from panel".into());
        assert!(!err.user_message().contains("401"));
    }

    #[test]
    fn test_insufficient_balance_message_shows_amounts() {
        let err = AppError::InsufficientBalance {
            required: 19_900,
            available: 5_000,
        };
        let text = err.user_message();
        assert!(text.contains("199"));
        assert!(text.contains("50"));
    }

    #[test]
    fn test_validation_error_maps_to_bad_request() {
        let resp = AppError::ValidationError("bad".into()).error_response();
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
