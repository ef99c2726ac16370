//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coordinator::TransactionError;
use resource::ResourceError;
use services::{OrderError, ServiceError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Business service error.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The task running the request's service call failed.
    #[error("Request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Service(err) => service_error_to_response(err),
            ApiError::Task(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, %status, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn service_error_to_response(err: ServiceError) -> (StatusCode, String) {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Order(OrderError::NotEnoughMoney { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Transaction(tx_err) => transaction_status(tx_err),
        ServiceError::Resource(ResourceError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
        ServiceError::Resource(ResourceError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Order(OrderError::PaymentFailed { .. })
        | ServiceError::LogWriteFailed { .. }
        | ServiceError::Resource(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn transaction_status(err: &TransactionError) -> StatusCode {
    match err {
        TransactionError::UnexpectedRollback { .. } => StatusCode::CONFLICT,
        TransactionError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        TransactionError::ResourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
