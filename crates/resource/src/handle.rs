use serde::{Deserialize, Serialize};

use crate::HandleId;

/// Lifecycle of one physical transaction handle.
///
/// ```text
/// Idle ──► Active ──┬──► Committed
///                   └──► RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HandleState {
    /// Allocated, the physical begin has not completed yet.
    #[default]
    Idle,

    /// Physical transaction is open.
    Active,

    /// Committed (terminal state).
    Committed,

    /// Rolled back (terminal state).
    RolledBack,
}

impl HandleState {
    /// Returns true if reads, writes and resolution are allowed.
    pub fn is_active(&self) -> bool {
        matches!(self, HandleState::Active)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleState::Committed | HandleState::RolledBack)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleState::Idle => "Idle",
            HandleState::Active => "Active",
            HandleState::Committed => "Committed",
            HandleState::RolledBack => "RolledBack",
        }
    }
}

impl std::fmt::Display for HandleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options for opening a physical transaction.
#[derive(Debug, Clone, Default)]
pub struct BeginOptions {
    /// Reject writes through the handle.
    pub read_only: bool,
}

impl BeginOptions {
    /// Creates options for a read-write transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options for a read-only transaction.
    pub fn read_only() -> Self {
        Self { read_only: true }
    }
}

/// One physical call observed by a resource, in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceCall {
    Begin(HandleId),
    Commit(HandleId),
    Rollback(HandleId),
}

impl ResourceCall {
    /// Returns the handle the call targeted.
    pub fn handle(&self) -> HandleId {
        match self {
            ResourceCall::Begin(h) | ResourceCall::Commit(h) | ResourceCall::Rollback(h) => *h,
        }
    }

    /// Returns true for commit and rollback calls.
    pub fn is_resolution(&self) -> bool {
        !matches!(self, ResourceCall::Begin(_))
    }
}
