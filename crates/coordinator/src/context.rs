//! Per call-chain transaction state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use common::{FrameId, HandleId};

use crate::definition::TransactionDefinition;
use crate::error::{Result, TransactionError};

/// One unit of work on the stack.
///
/// A physical frame owns its handle; a logical frame rides on the handle
/// of the nearest physical frame below it.
#[derive(Debug, Clone)]
pub struct TransactionFrame {
    id: FrameId,
    physical: bool,
    handle: HandleId,
    rollback_only: bool,
    local_rollback: bool,
    suspended: Option<HandleId>,
    read_only: bool,
    abandoned: bool,
    definition: TransactionDefinition,
    started_at: Instant,
}

impl TransactionFrame {
    /// Creates a frame backed by its own physical transaction.
    pub fn physical(
        handle: HandleId,
        suspended: Option<HandleId>,
        definition: TransactionDefinition,
    ) -> Self {
        Self {
            id: FrameId::next(),
            physical: true,
            handle,
            rollback_only: false,
            local_rollback: false,
            suspended,
            read_only: definition.read_only,
            abandoned: false,
            definition,
            started_at: Instant::now(),
        }
    }

    /// Creates a frame that participates in the physical transaction of
    /// `handle`.
    pub fn logical(handle: HandleId, read_only: bool, definition: TransactionDefinition) -> Self {
        Self {
            id: FrameId::next(),
            physical: false,
            handle,
            rollback_only: false,
            local_rollback: false,
            suspended: None,
            read_only,
            abandoned: false,
            definition,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn is_physical(&self) -> bool {
        self.physical
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Returns true once this frame or a participant doomed the physical
    /// transaction.
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Returns true if the owner of this physical frame asked for a
    /// rollback itself.
    pub fn is_local_rollback(&self) -> bool {
        self.local_rollback
    }

    pub fn suspended(&self) -> Option<HandleId> {
        self.suspended
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            id: self.id,
            is_new_transaction: self.physical,
            rollback_only: self.rollback_only,
            read_only: self.read_only,
            handle: self.handle,
            suspended: self.suspended,
            name: self.definition.name.clone(),
        }
    }
}

/// Read-only view of a frame, for callers that inspect the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub id: FrameId,
    /// True if this frame opened its own physical transaction.
    pub is_new_transaction: bool,
    pub rollback_only: bool,
    pub read_only: bool,
    pub handle: HandleId,
    pub suspended: Option<HandleId>,
    pub name: Option<String>,
}

/// LIFO stack of active frames. Empty means no transaction is active.
#[derive(Debug, Default)]
pub struct TransactionStack {
    frames: Vec<TransactionFrame>,
}

impl TransactionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame.
    ///
    /// A logical frame must share the handle of the frame below it, and
    /// joins an already doomed transaction as rollback-only.
    pub fn push(&mut self, mut frame: TransactionFrame) {
        debug_assert!(
            frame.physical || self.peek().is_some_and(|top| top.handle == frame.handle),
            "logical frame must ride on the handle of the frame below it"
        );
        if !frame.physical && self.peek().is_some_and(|top| top.rollback_only) {
            frame.rollback_only = true;
        }
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<TransactionFrame> {
        self.frames.pop()
    }

    pub fn peek(&self) -> Option<&TransactionFrame> {
        self.frames.last()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns the physical frame that governs the stack top.
    pub fn governing_physical(&self) -> Option<&TransactionFrame> {
        self.frames.iter().rev().find(|f| f.physical)
    }

    /// Marks the top physical transaction rollback-only.
    ///
    /// Every frame sharing that physical resource is flagged, from the
    /// top down to and including the physical frame. Returns false if
    /// the stack is empty.
    pub fn mark_rollback_only(&mut self) -> bool {
        if self.frames.is_empty() {
            return false;
        }
        for frame in self.frames.iter_mut().rev() {
            frame.rollback_only = true;
            if frame.physical {
                break;
            }
        }
        true
    }

    /// Flags a frame, and every frame opened above it, as abandoned by a
    /// dropped unit of work.
    ///
    /// Returns `None` if the frame is not open, otherwise whether every
    /// frame below it was already abandoned, meaning nothing left on the
    /// call-chain will ever end it.
    pub fn abandon_from(&mut self, id: FrameId) -> Option<bool> {
        let index = self.frames.iter().position(|f| f.id == id)?;
        for frame in &mut self.frames[index..] {
            frame.abandoned = true;
        }
        Some(self.frames[..index].iter().all(|f| f.abandoned))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionFrame> {
        self.frames.iter()
    }
}

struct ContextInner {
    stack: Mutex<TransactionStack>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let stack = self.stack.get_mut().unwrap_or_else(PoisonError::into_inner);
        if stack.is_empty() {
            return;
        }
        let open: Vec<String> = stack.iter().map(|f| f.id.to_string()).collect();
        tracing::error!(frames = ?open, "transaction context dropped with open frames");
    }
}

/// Transaction state of one logical call-chain.
///
/// Create one per inbound operation and pass it along the call chain.
/// Clones share the same stack, so a clone can be handed to a nested
/// unit of work; never share a context between concurrently running
/// chains.
#[derive(Clone)]
pub struct TransactionContext {
    inner: Arc<ContextInner>,
}

impl TransactionContext {
    /// Creates a context with no active transaction.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                stack: Mutex::new(TransactionStack::new()),
            }),
        }
    }

    pub(crate) fn with_stack<T>(&self, f: impl FnOnce(&mut TransactionStack) -> T) -> T {
        let mut stack = self
            .inner
            .stack
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut stack)
    }

    /// Returns true if a physical transaction is active on this chain.
    pub fn is_transaction_active(&self) -> bool {
        self.with_stack(|s| !s.is_empty())
    }

    /// Returns true if the active transaction is read-only.
    pub fn is_current_read_only(&self) -> bool {
        self.with_stack(|s| s.peek().is_some_and(|f| f.read_only))
    }

    /// Returns the number of open frames.
    pub fn depth(&self) -> usize {
        self.with_stack(|s| s.depth())
    }

    /// Returns the handle reads and writes should go through.
    pub fn current_handle(&self) -> Option<HandleId> {
        self.with_stack(|s| s.peek().map(|f| f.handle))
    }

    /// Returns the handle of the active transaction, or
    /// `NoActiveTransaction`.
    pub fn require_handle(&self) -> Result<HandleId> {
        self.current_handle()
            .ok_or(TransactionError::NoActiveTransaction)
    }

    /// Returns a view of the innermost frame.
    pub fn current(&self) -> Option<FrameSnapshot> {
        self.with_stack(|s| s.peek().map(TransactionFrame::snapshot))
    }

    /// Returns a view of a specific open frame.
    pub fn frame(&self, id: FrameId) -> Option<FrameSnapshot> {
        self.with_stack(|s| s.iter().find(|f| f.id == id).map(TransactionFrame::snapshot))
    }

    /// Asks for the current unit of work to be rolled back.
    ///
    /// On a physical frame this is a local decision and the frame rolls
    /// back quietly when it ends. On a participating frame it dooms the
    /// shared physical transaction, exactly like a failure would.
    pub fn set_rollback_only(&self) -> Result<()> {
        self.with_stack(|s| {
            let top_is_physical = s
                .peek()
                .map(|f| f.physical)
                .ok_or(TransactionError::NoActiveTransaction)?;
            if top_is_physical {
                if let Some(top) = s.frames.last_mut() {
                    top.local_rollback = true;
                }
            } else {
                s.mark_rollback_only();
            }
            Ok(())
        })
    }

    pub(crate) fn abandon_from(&self, id: FrameId) -> Option<bool> {
        self.with_stack(|s| s.abandon_from(id))
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("depth", &self.depth())
            .finish()
    }
}
