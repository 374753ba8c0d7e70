use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("OpenEdX connection error: {0}")]
    EdxConnection(String),

    #[error("OpenEdX API returned {status}: {body}")]
    EdxStatus { status: u16, body: String },

    #[error("Invalid response from OpenEdX: {0}")]
    InvalidResponse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Payment is not configured")]
    PaymentsDisabled,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}

impl StoreError {
    fn kind(&self) -> &'static str {
        match self {
            StoreError::EdxConnection(_)
            | StoreError::EdxStatus { .. }
            | StoreError::InvalidResponse(_) => "upstream_error",
            StoreError::Database(_) | StoreError::PasswordHash(_) => "internal_error",
            StoreError::Json(_) | StoreError::Http(_) => "protocol_error",
            StoreError::Unauthorized => "unauthorized",
            StoreError::InvalidCredentials(_) => "invalid_credentials",
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::Validation(_) | StoreError::Registration(_) => "validation_error",
            StoreError::EmptyCart => "empty_cart",
            StoreError::PaymentsDisabled => "payments_disabled",
            StoreError::InvalidSignature => "invalid_signature",
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            StoreError::EdxConnection(_)
            | StoreError::EdxStatus { .. }
            | StoreError::InvalidResponse(_)
            | StoreError::Json(_)
            | StoreError::Http(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            StoreError::Database(_) => {
                tracing::error!("Database error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            StoreError::PasswordHash(_) => {
                tracing::error!("Password hashing error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            StoreError::Unauthorized | StoreError::InvalidCredentials(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            StoreError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            StoreError::Validation(_) | StoreError::Registration(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            StoreError::EmptyCart => (StatusCode::BAD_REQUEST, self.to_string()),
            StoreError::PaymentsDisabled => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            StoreError::InvalidSignature => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": self.kind(),
            }
        }));

        (status, body).into_response()
    }
}
