//! What a unit of work asks of the coordinator.

use std::time::Duration;

use crate::classifier::{RollbackPolicy, SignalKind};

/// How a new unit of work relates to an already active transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join the current physical transaction, or open one if none exists.
    #[default]
    Required,

    /// Always suspend the current physical transaction (if any) and open
    /// an independent one.
    RequiresNew,
}

impl Propagation {
    /// Returns the propagation name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "required",
            Propagation::RequiresNew => "requires_new",
        }
    }
}

impl std::fmt::Display for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(Propagation::Required),
            "requires_new" => Ok(Propagation::RequiresNew),
            other => Err(format!("Unknown propagation: {other}")),
        }
    }
}

/// Settings for one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionDefinition {
    /// How to relate to an active transaction.
    pub propagation: Propagation,

    /// Open physical transactions read-only. Ignored when joining; a
    /// participant sees the read-only setting of the transaction it joins.
    pub read_only: bool,

    /// Upper bound for the scoped helper's block.
    pub timeout: Option<Duration>,

    /// Label used in logs.
    pub name: Option<String>,

    /// Business signals that must roll back.
    pub rollback_policy: RollbackPolicy,
}

impl TransactionDefinition {
    /// Creates a definition with the given propagation and defaults.
    pub fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    /// Creates a `Required` definition.
    pub fn required() -> Self {
        Self::new(Propagation::Required)
    }

    /// Creates a `RequiresNew` definition.
    pub fn requires_new() -> Self {
        Self::new(Propagation::RequiresNew)
    }

    /// Sets the log label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks newly opened physical transactions as read-only.
    pub fn with_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Bounds how long the scoped block may run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Forces a rollback when the block raises this business signal.
    pub fn with_rollback_for(mut self, kind: SignalKind) -> Self {
        self.rollback_policy = self.rollback_policy.rollback_for(kind);
        self
    }

    /// Returns the log label, or `"anonymous"`.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}

impl From<Propagation> for TransactionDefinition {
    fn from(propagation: Propagation) -> Self {
        Self::new(propagation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_required_read_write() {
        let def = TransactionDefinition::default();
        assert_eq!(def.propagation, Propagation::Required);
        assert!(!def.read_only);
        assert!(def.timeout.is_none());
        assert!(def.rollback_policy.is_empty());
        assert_eq!(def.label(), "anonymous");
    }

    #[test]
    fn builder_sets_fields() {
        let kind = SignalKind::new("not_enough_money");
        let def = TransactionDefinition::requires_new()
            .with_name("order")
            .with_read_only()
            .with_timeout(Duration::from_millis(50))
            .with_rollback_for(kind.clone());

        assert_eq!(def.propagation, Propagation::RequiresNew);
        assert!(def.read_only);
        assert_eq!(def.timeout, Some(Duration::from_millis(50)));
        assert_eq!(def.label(), "order");
        assert!(def.rollback_policy.forces_rollback(&kind));
    }

    #[test]
    fn propagation_parses_and_displays() {
        assert_eq!(
            "requires_new".parse::<Propagation>().unwrap(),
            Propagation::RequiresNew
        );
        assert_eq!(Propagation::Required.to_string(), "required");
        assert!("nested".parse::<Propagation>().is_err());
    }
}
