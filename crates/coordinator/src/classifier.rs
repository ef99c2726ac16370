//! Outcome classification: commit or roll back?

use std::borrow::Cow;
use std::collections::HashSet;

/// Name of an expected business condition, such as `not_enough_money`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalKind(Cow<'static, str>);

impl SignalKind {
    /// Creates a signal kind from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a signal kind from an owned name.
    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the signal name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a unit of work failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCategory {
    /// An expected business condition. Commits unless the rollback
    /// policy lists its kind.
    BusinessSignal(SignalKind),

    /// An unexpected fault. Always rolls back.
    SystemFault,
}

/// How a unit of work finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Returned normally.
    Normal,

    /// Raised a failure of the given category.
    Failed(FailureCategory),
}

impl Outcome {
    /// Shorthand for `Failed(SystemFault)`.
    pub fn system_fault() -> Self {
        Outcome::Failed(FailureCategory::SystemFault)
    }

    /// Shorthand for `Failed(BusinessSignal(kind))`.
    pub fn business(kind: SignalKind) -> Self {
        Outcome::Failed(FailureCategory::BusinessSignal(kind))
    }

    /// Returns true if the unit of work returned normally.
    pub fn is_normal(&self) -> bool {
        matches!(self, Outcome::Normal)
    }
}

/// Business signal kinds that force a rollback instead of a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackPolicy {
    rollback_for: HashSet<SignalKind>,
}

impl RollbackPolicy {
    /// Creates an empty policy: every business signal commits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signal kind that must roll back.
    pub fn rollback_for(mut self, kind: SignalKind) -> Self {
        self.rollback_for.insert(kind);
        self
    }

    /// Returns true if the signal kind must roll back.
    pub fn forces_rollback(&self, kind: &SignalKind) -> bool {
        self.rollback_for.contains(kind)
    }

    /// Returns true if no signal kind is overridden.
    pub fn is_empty(&self) -> bool {
        self.rollback_for.is_empty()
    }
}

/// Decides whether a finished unit of work must roll back.
///
/// Rollback-only state set by other frames is not considered here; the
/// coordinator combines it with this result.
pub fn classify(outcome: &Outcome, policy: &RollbackPolicy) -> bool {
    match outcome {
        Outcome::Normal => false,
        Outcome::Failed(FailureCategory::SystemFault) => true,
        Outcome::Failed(FailureCategory::BusinessSignal(kind)) => policy.forces_rollback(kind),
    }
}

/// Error types that know which failure category they belong to.
///
/// The scoped helper uses this to turn a failed block into an `Outcome`.
pub trait Classify {
    fn failure_category(&self) -> FailureCategory;
}
