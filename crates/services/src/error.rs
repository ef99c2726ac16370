//! Service error types.

use coordinator::{Classify, FailureCategory, TransactionError};
use resource::ResourceError;
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur in business services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The transaction coordinator rejected or rolled back the unit of work.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// A record operation failed.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Writing an audit log entry failed.
    #[error("Failed to write log entry: {message}")]
    LogWriteFailed { message: String },

    /// An order could not be placed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Input was rejected before any transaction was opened.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ServiceError {
    /// Returns true if the caller's transaction was rolled back because a
    /// participant failed, although the caller itself succeeded.
    pub fn is_unexpected_rollback(&self) -> bool {
        matches!(
            self,
            ServiceError::Transaction(TransactionError::UnexpectedRollback { .. })
        )
    }
}

impl Classify for ServiceError {
    fn failure_category(&self) -> FailureCategory {
        match self {
            ServiceError::Order(e) => e.failure_category(),
            _ => FailureCategory::SystemFault,
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
