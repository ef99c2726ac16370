use thiserror::Error;

use crate::{HandleId, HandleState};

/// Errors that can occur when interacting with a transactional resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The backing store could not open a physical transaction.
    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    /// The handle was never issued by this resource.
    #[error("Unknown handle: {0}")]
    UnknownHandle(HandleId),

    /// The handle is not in the state the operation requires.
    #[error("Handle {handle} is {state}, expected Active")]
    InvalidHandleState { handle: HandleId, state: HandleState },

    /// A write was attempted through a read-only handle.
    #[error("Handle {0} is read-only")]
    ReadOnly(HandleId),

    /// A record key or table name was rejected.
    #[error("Invalid record key: {0}")]
    InvalidKey(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;
