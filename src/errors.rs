// src/errors.rs
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::payment_provider::ProviderError;

/// Persistence failures, independent of the backing engine.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Transaction not completed (status: {0})")]
    TransactionNotReady(String),

    #[error("Payment provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Payment provider error: {0}")]
    ProviderError(String),

    #[error("Payment service is not available")]
    ProviderUnavailable,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string()),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation failed".to_string()),
            AppError::InvalidId(_) => (StatusCode::BAD_REQUEST, "Invalid ID format".to_string()),
            AppError::TransactionNotFound => (StatusCode::NOT_FOUND, "Transaction not found".to_string()),
            AppError::TransactionNotReady(_) => (StatusCode::BAD_REQUEST, "Transaction not completed".to_string()),
            AppError::ProviderAuth(_) => (StatusCode::BAD_GATEWAY, "Payment failed".to_string()),
            AppError::ProviderError(_) => (StatusCode::BAD_GATEWAY, "Payment failed".to_string()),
            AppError::ProviderUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string()),
            AppError::ConfigurationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error".to_string()),
        };

        // Provider internals stay in the logs.
        let message = match &self {
            AppError::ProviderAuth(_) => {
                "Payment service is temporarily unavailable. Please try again later.".to_string()
            }
            AppError::ProviderError(_) => "Payment request failed. Please try again later.".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "message": message,
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Auth(msg) => AppError::ProviderAuth(msg),
            other => AppError::ProviderError(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::ValidationError(format!("JSON parsing error: {}", err.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::ValidationError(err.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidId(err.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        let cases = [
            (AppError::invalid_data("phone"), StatusCode::BAD_REQUEST),
            (AppError::TransactionNotFound, StatusCode::NOT_FOUND),
            (AppError::TransactionNotReady("initiated".into()), StatusCode::BAD_REQUEST),
            (AppError::ProviderAuth("401".into()), StatusCode::BAD_GATEWAY),
            (AppError::ProviderError("timeout".into()), StatusCode::BAD_GATEWAY),
            (AppError::ProviderUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                AppError::Store(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn provider_auth_error_maps_to_provider_auth() {
        let err: AppError = ProviderError::Auth("bad key".into()).into();
        assert!(matches!(err, AppError::ProviderAuth(_)));

        let err: AppError = ProviderError::Communication("reset".into()).into();
        assert!(matches!(err, AppError::ProviderError(_)));
    }
}
