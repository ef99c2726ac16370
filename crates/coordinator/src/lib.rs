//! Transaction propagation coordinator.
//!
//! Lets independently written units of work join, nest or isolate
//! themselves against one transactional resource while every physical
//! transaction reaches exactly one commit/rollback decision.
//!
//! - `Required` units of work join the current physical transaction
//!   (or open one) and share its fate.
//! - `RequiresNew` units of work suspend the current physical
//!   transaction and run in an independent one.
//!
//! A failed `Required` participant marks the shared physical transaction
//! rollback-only. When the owner later asks to commit, the coordinator
//! rolls back and reports `UnexpectedRollback` instead of committing.

pub mod classifier;
pub mod context;
pub mod coordinator;
pub mod definition;
pub mod error;
pub mod policy;
pub mod scope;

pub use classifier::{Classify, FailureCategory, Outcome, RollbackPolicy, SignalKind, classify};
pub use common::FrameId;
pub use context::{FrameSnapshot, TransactionContext, TransactionFrame, TransactionStack};
pub use coordinator::{Completion, TransactionCoordinator};
pub use definition::{Propagation, TransactionDefinition};
pub use error::{Result, TransactionError};
pub use policy::{Decision, decide};
