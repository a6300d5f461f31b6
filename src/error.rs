//! Error handling for the application

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::config::ConfigError;
use crate::pricing::responses::PricingErrorResponse;
use crate::pricing::PricingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Pricing(err) => match err {
                PricingError::NotFound { .. } => StatusCode::NOT_FOUND,
                PricingError::InvalidInput { .. } | PricingError::Unserviceable { .. } => {
                    StatusCode::BAD_REQUEST
                }
                PricingError::InvalidState { .. } => StatusCode::CONFLICT,
                PricingError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Pricing(err) => {
                if let PricingError::Configuration { message } = err {
                    tracing::error!("Pricing configuration error: {}", message);
                }
                let details = match err {
                    PricingError::InvalidInput { field, .. } => {
                        Some(serde_json::json!({ "field": field }))
                    }
                    PricingError::Unserviceable { zip_code } => {
                        Some(serde_json::json!({ "zip_code": zip_code }))
                    }
                    _ => None,
                };
                PricingErrorResponse {
                    error_type: err.error_type().to_string(),
                    message: err.to_string(),
                    details,
                }
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                PricingErrorResponse::internal("Database error")
            }
            AppError::Migration(e) => {
                tracing::error!("Migration error: {}", e);
                PricingErrorResponse::internal("Database error")
            }
            AppError::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                PricingErrorResponse::internal("Configuration error")
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                PricingErrorResponse::internal("Internal error")
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
