//! Transaction coordinator: begin and end units of work.

use common::FrameId;
use resource::{BeginOptions, HandleId, ResourceManager};

use crate::classifier::{Outcome, classify};
use crate::context::{TransactionContext, TransactionFrame};
use crate::definition::TransactionDefinition;
use crate::error::{Result, TransactionError};
use crate::policy::{self, Decision};

/// What `end` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Physical transaction committed.
    Committed,

    /// Physical transaction rolled back at its owner's request.
    RolledBack,

    /// Participating frame finished; the physical transaction is still
    /// open and will be resolved by its owner.
    Participated,

    /// Participating frame failed and doomed the physical transaction.
    MarkedRollbackOnly,
}

/// Maps logical units of work onto physical transactions of one resource.
///
/// The coordinator holds no per-chain state; every call takes the
/// caller's `TransactionContext`.
#[derive(Clone)]
pub struct TransactionCoordinator<R: ResourceManager> {
    resource: R,
}

impl<R: ResourceManager> TransactionCoordinator<R> {
    /// Creates a coordinator over the given resource.
    pub fn new(resource: R) -> Self {
        Self { resource }
    }

    /// Returns the underlying resource.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Opens a unit of work and returns its frame ID.
    ///
    /// Abandoned frames left on the stack by dropped units of work are
    /// resolved first. Fails with `ResourceUnavailable` if a physical
    /// transaction was needed and could not be opened; no frame is pushed
    /// in that case.
    #[tracing::instrument(
        skip(self, ctx, definition),
        fields(tx = definition.label(), propagation = %definition.propagation)
    )]
    pub async fn begin(
        &self,
        ctx: &TransactionContext,
        definition: &TransactionDefinition,
    ) -> Result<FrameId> {
        self.resolve_abandoned(ctx, None).await?;

        let decision = ctx.with_stack(|stack| policy::decide(definition.propagation, stack.peek()));

        let frame = match decision {
            Decision::Join(handle) => {
                let read_only = ctx.is_current_read_only();
                metrics::counter!("tx_logical_joined_total").increment(1);
                TransactionFrame::logical(handle, read_only, definition.clone())
            }
            Decision::OpenNew => {
                let handle = self.open_physical(definition).await?;
                TransactionFrame::physical(handle, None, definition.clone())
            }
            Decision::SuspendAndOpenNew(suspended) => {
                tracing::debug!(%suspended, "suspending current transaction");
                let handle = self.open_physical(definition).await?;
                TransactionFrame::physical(handle, Some(suspended), definition.clone())
            }
        };

        let id = frame.id();
        tracing::debug!(
            frame = %id,
            handle = %frame.handle(),
            physical = frame.is_physical(),
            "unit of work started"
        );
        ctx.with_stack(|stack| stack.push(frame));
        Ok(id)
    }

    /// Ends the unit of work `frame` with the given outcome.
    ///
    /// `frame` must be the innermost open frame (abandoned frames above it
    /// are resolved first as system faults). A participating frame never
    /// touches the resource; a physical frame commits or rolls back.
    /// When a physical frame's own outcome asked for a commit but a
    /// participant had marked it rollback-only, the transaction is rolled
    /// back and `UnexpectedRollback` is returned.
    #[tracing::instrument(skip(self, ctx, outcome), fields(frame = %frame))]
    pub async fn end(
        &self,
        ctx: &TransactionContext,
        frame: FrameId,
        outcome: Outcome,
    ) -> Result<Completion> {
        self.resolve_abandoned(ctx, Some(frame)).await?;

        let popped = ctx.with_stack(|stack| match stack.peek() {
            Some(top) if top.id() == frame => Ok(stack.pop()),
            top => Err(TransactionError::FrameMismatch {
                expected: top.map(TransactionFrame::id),
                actual: frame,
            }),
        })?;

        match popped {
            Some(popped) => self.complete(ctx, popped, &outcome).await,
            None => Err(TransactionError::FrameMismatch {
                expected: None,
                actual: frame,
            }),
        }
    }

    /// Resolves every abandoned frame on the stack as a system fault.
    ///
    /// Call this after cancelling the outermost unit of work of a chain,
    /// since no enclosing frame is left to clean up after it. Returns the
    /// number of frames resolved.
    pub async fn recover(&self, ctx: &TransactionContext) -> Result<usize> {
        self.resolve_abandoned(ctx, None).await
    }

    async fn open_physical(&self, definition: &TransactionDefinition) -> Result<HandleId> {
        let options = BeginOptions {
            read_only: definition.read_only,
        };
        let handle = self.resource.begin(options).await.map_err(|e| {
            tracing::warn!(error = %e, "failed to open physical transaction");
            TransactionError::ResourceUnavailable(e)
        })?;
        metrics::counter!("tx_physical_begun_total").increment(1);
        Ok(handle)
    }

    async fn resolve_abandoned(
        &self,
        ctx: &TransactionContext,
        keep: Option<FrameId>,
    ) -> Result<usize> {
        let mut resolved = 0;
        loop {
            let abandoned = ctx.with_stack(|stack| match stack.peek() {
                Some(top) if top.is_abandoned() && Some(top.id()) != keep => stack.pop(),
                _ => None,
            });
            let Some(frame) = abandoned else {
                return Ok(resolved);
            };

            tracing::warn!(frame = %frame.id(), "resolving abandoned unit of work");
            metrics::counter!("tx_abandoned_total").increment(1);
            self.complete(ctx, frame, &Outcome::system_fault()).await?;
            resolved += 1;
        }
    }

    async fn complete(
        &self,
        ctx: &TransactionContext,
        frame: TransactionFrame,
        outcome: &Outcome,
    ) -> Result<Completion> {
        let should_rollback =
            classify(outcome, &frame.definition().rollback_policy) || frame.is_local_rollback();

        if !frame.is_physical() {
            if should_rollback {
                ctx.with_stack(|stack| stack.mark_rollback_only());
                tracing::info!(
                    frame = %frame.id(),
                    handle = %frame.handle(),
                    "participating unit of work failed, transaction marked rollback-only"
                );
                return Ok(Completion::MarkedRollbackOnly);
            }
            return Ok(Completion::Participated);
        }

        let handle = frame.handle();
        let completion = if frame.is_rollback_only() || should_rollback {
            self.resource
                .rollback(handle)
                .await
                .map_err(TransactionError::from_resolution)?;
            metrics::counter!("tx_rolled_back_total").increment(1);
            tracing::info!(frame = %frame.id(), %handle, "transaction rolled back");
            Completion::RolledBack
        } else {
            self.resource
                .commit(handle)
                .await
                .map_err(TransactionError::from_resolution)?;
            metrics::counter!("tx_committed_total").increment(1);
            tracing::info!(frame = %frame.id(), %handle, "transaction committed");
            Completion::Committed
        };

        metrics::histogram!("tx_duration_seconds")
            .record(frame.started_at().elapsed().as_secs_f64());

        if let Some(suspended) = frame.suspended() {
            tracing::debug!(%suspended, "resuming suspended transaction");
        }

        if frame.is_rollback_only() && !should_rollback {
            metrics::counter!("tx_unexpected_rollback_total").increment(1);
            tracing::warn!(
                frame = %frame.id(),
                %handle,
                "commit requested but transaction was marked rollback-only"
            );
            return Err(TransactionError::UnexpectedRollback {
                frame: frame.id(),
                handle,
            });
        }

        Ok(completion)
    }
}
