//! Order payment state.

use serde::{Deserialize, Serialize};

/// Payment progress of an order.
///
/// ```text
/// (unpaid) ──┬──► Waiting
///            └──► Complete
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayState {
    /// Payment was refused; the customer has to transfer funds.
    Waiting,

    /// Payment went through (terminal state).
    Complete,
}

impl PayState {
    /// Returns true if no further payment is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayState::Complete)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayState::Waiting => "Waiting",
            PayState::Complete => "Complete",
        }
    }
}

impl std::fmt::Display for PayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
