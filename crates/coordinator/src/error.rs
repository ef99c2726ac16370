//! Coordinator error types.

use std::time::Duration;

use common::{FrameId, HandleId};
use resource::{HandleState, ResourceError};
use thiserror::Error;

use crate::classifier::{Classify, FailureCategory};

/// Errors raised by the transaction coordinator.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The backing store could not open a physical transaction. No frame
    /// was created.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(#[source] ResourceError),

    /// `end` was called for a frame that is not the current stack top.
    #[error("Frame mismatch: cannot end {actual}, current frame is {}", describe(.expected))]
    FrameMismatch {
        expected: Option<FrameId>,
        actual: FrameId,
    },

    /// Commit or rollback was requested on a handle that is not active.
    #[error("Invalid handle state: {handle} is {state}")]
    InvalidHandleState { handle: HandleId, state: HandleState },

    /// The caller completed normally but the physical transaction was
    /// rolled back because a participant marked it rollback-only.
    #[error(
        "Transaction {frame} rolled back because it has been marked as rollback-only (handle {handle})"
    )]
    UnexpectedRollback { frame: FrameId, handle: HandleId },

    /// The scoped block exceeded its timeout; its frame was rolled back.
    #[error("Transaction {frame} timed out after {after:?}")]
    TimedOut { frame: FrameId, after: Duration },

    /// An operation needed an active transaction and none was open.
    #[error("No active transaction")]
    NoActiveTransaction,

    /// Commit or rollback failed in the backing store.
    #[error("Resource error: {0}")]
    Resource(#[source] ResourceError),
}

impl TransactionError {
    /// Returns true for API misuse that must never be retried.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            TransactionError::FrameMismatch { .. } | TransactionError::InvalidHandleState { .. }
        )
    }

    /// Maps a commit/rollback failure from the backing store.
    pub(crate) fn from_resolution(err: ResourceError) -> Self {
        match err {
            ResourceError::InvalidHandleState { handle, state } => {
                TransactionError::InvalidHandleState { handle, state }
            }
            other => TransactionError::Resource(other),
        }
    }
}

impl Classify for TransactionError {
    fn failure_category(&self) -> FailureCategory {
        FailureCategory::SystemFault
    }
}

fn describe(frame: &Option<FrameId>) -> String {
    match frame {
        Some(frame) => frame.to_string(),
        None => "none (stack is empty)".to_string(),
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, TransactionError>;
