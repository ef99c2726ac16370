//! Scoped helper: run a block as one unit of work.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use common::FrameId;
use futures_util::FutureExt;
use resource::ResourceManager;

use crate::classifier::{Classify, Outcome};
use crate::context::TransactionContext;
use crate::coordinator::TransactionCoordinator;
use crate::definition::TransactionDefinition;
use crate::error::TransactionError;

/// Marks the frame abandoned if the helper's future is dropped before
/// the frame was ended.
///
/// When nothing left on the call-chain can end the frame, the guard hands
/// the context to a background task that rolls it back.
struct AbandonGuard<'a, R: ResourceManager + Clone + 'static> {
    coordinator: &'a TransactionCoordinator<R>,
    ctx: TransactionContext,
    frame: FrameId,
    armed: bool,
}

impl<'a, R: ResourceManager + Clone + 'static> AbandonGuard<'a, R> {
    fn new(
        coordinator: &'a TransactionCoordinator<R>,
        ctx: &TransactionContext,
        frame: FrameId,
    ) -> Self {
        Self {
            coordinator,
            ctx: ctx.clone(),
            frame,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    fn spawn_recovery(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                frame = %self.frame,
                "no runtime to resolve abandoned unit of work, transaction left open"
            );
            return;
        };

        let coordinator = self.coordinator.clone();
        let ctx = self.ctx.clone();
        runtime.spawn(async move {
            match coordinator.recover(&ctx).await {
                Ok(resolved) => tracing::debug!(resolved, "abandoned call-chain resolved"),
                Err(e) => tracing::error!(error = %e, "failed to resolve abandoned call-chain"),
            }
        });
    }
}

impl<R: ResourceManager + Clone + 'static> Drop for AbandonGuard<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(outermost) = self.ctx.abandon_from(self.frame) else {
            return;
        };
        tracing::warn!(frame = %self.frame, outermost, "unit of work dropped before completion");
        if outermost {
            self.spawn_recovery();
        }
    }
}

impl<R: ResourceManager + Clone + 'static> TransactionCoordinator<R> {
    /// Runs `work` as one unit of work under `definition`.
    ///
    /// The frame is always ended exactly once:
    /// - `Ok` ends it with `Outcome::Normal`; a resolution error (such as
    ///   `UnexpectedRollback`) is returned instead of the value.
    /// - `Err` ends it with the error's failure category and returns the
    ///   block's error, unless that error asked for a commit and the
    ///   transaction was rolled back anyway: then `UnexpectedRollback` is
    ///   returned. Other resolution errors are logged.
    /// - A panic ends it as a system fault and resumes unwinding.
    /// - Exceeding `definition.timeout` drops the block, ends the frame as
    ///   a system fault and returns `TimedOut`.
    ///
    /// If this future is itself dropped mid-flight the frame is marked
    /// abandoned. An enclosing unit of work resolves it when it ends; if
    /// there is none, it is rolled back on a background task.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let order = coordinator
    ///     .execute(&ctx, &TransactionDefinition::required(), |ctx| async move {
    ///         repository.save(&ctx, &order).await?;
    ///         Ok::<_, ServiceError>(order)
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &TransactionContext,
        definition: &TransactionDefinition,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<TransactionError> + std::fmt::Display,
    {
        let frame = self.begin(ctx, definition).await?;
        let guard = AbandonGuard::new(self, ctx, frame);

        let block = AssertUnwindSafe(work(ctx.clone())).catch_unwind();
        let finished = match definition.timeout {
            Some(after) => match tokio::time::timeout(after, block).await {
                Ok(finished) => finished,
                Err(_) => {
                    let tx = definition.label();
                    tracing::warn!(%frame, ?after, tx, "unit of work timed out");
                    self.end_quietly(ctx, frame, Outcome::system_fault()).await;
                    guard.disarm();
                    return Err(TransactionError::TimedOut { frame, after }.into());
                }
            },
            None => block.await,
        };

        match finished {
            Ok(Ok(value)) => {
                let ended = self.end(ctx, frame, Outcome::Normal).await;
                guard.disarm();
                ended?;
                Ok(value)
            }
            Ok(Err(err)) => {
                tracing::debug!(%frame, error = %err, "unit of work failed");
                let outcome = Outcome::Failed(err.failure_category());
                let ended = self.end(ctx, frame, outcome).await;
                guard.disarm();
                match ended {
                    Err(e @ TransactionError::UnexpectedRollback { .. }) => {
                        tracing::warn!(
                            %frame,
                            error = %err,
                            "failure superseded by unexpected rollback"
                        );
                        Err(e.into())
                    }
                    Err(e) => {
                        tracing::error!(%frame, error = %e, "failed to resolve unit of work");
                        Err(err)
                    }
                    Ok(_) => Err(err),
                }
            }
            Err(panic) => {
                tracing::error!(%frame, tx = definition.label(), "unit of work panicked");
                self.end_quietly(ctx, frame, Outcome::system_fault()).await;
                guard.disarm();
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn end_quietly(&self, ctx: &TransactionContext, frame: FrameId, outcome: Outcome) {
        if let Err(e) = self.end(ctx, frame, outcome).await {
            tracing::error!(%frame, error = %e, "failed to resolve unit of work");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::classifier::{FailureCategory, SignalKind};
    use resource::{HandleState, InMemoryResource};
    use thiserror::Error;

    const NOT_ENOUGH_MONEY: SignalKind = SignalKind::new("not_enough_money");

    #[derive(Debug, Error)]
    enum TestError {
        #[error("business")]
        Business,
        #[error("fault")]
        Fault,
        #[error(transparent)]
        Transaction(#[from] TransactionError),
    }

    impl Classify for TestError {
        fn failure_category(&self) -> FailureCategory {
            match self {
                TestError::Business => FailureCategory::BusinessSignal(NOT_ENOUGH_MONEY),
                TestError::Fault | TestError::Transaction(_) => FailureCategory::SystemFault,
            }
        }
    }

    fn should_panic() -> bool {
        true
    }

    fn setup() -> (TransactionCoordinator<InMemoryResource>, InMemoryResource) {
        let resource = InMemoryResource::new();
        (TransactionCoordinator::new(resource.clone()), resource)
    }

    #[tokio::test]
    async fn test_ok_commits_and_returns_value() {
        let (coordinator, resource) = setup();
        let ctx = TransactionContext::new();

        let (value, handle) = coordinator
            .execute(&ctx, &TransactionDefinition::required(), |ctx| async move {
                Ok::<_, TestError>((42, ctx.require_handle()?))
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            resource.handle_state(handle).await.unwrap(),
            HandleState::Committed
        );
        assert!(!ctx.is_transaction_active());
    }

    #[tokio::test]
    async fn test_system_fault_rolls_back_and_returns_block_error() {
        let (coordinator, resource) = setup();
        let ctx = TransactionContext::new();
        let handle = std::sync::Arc::new(std::sync::Mutex::new(None));

        let seen = handle.clone();
        let result: Result<(), TestError> = coordinator
            .execute(&ctx, &TransactionDefinition::required(), |ctx| async move {
                *seen.lock().unwrap() = ctx.current_handle();
                Err(TestError::Fault)
            })
            .await;

        assert!(matches!(result, Err(TestError::Fault)));
        let handle = handle.lock().unwrap().unwrap();
        assert_eq!(
            resource.handle_state(handle).await.unwrap(),
            HandleState::RolledBack
        );
    }

    #[tokio::test]
    async fn test_business_signal_commits() {
        let (coordinator, resource) = setup();
        let ctx = TransactionContext::new();

        let result: Result<(), TestError> = coordinator
            .execute(&ctx, &TransactionDefinition::required(), |_| async {
                Err(TestError::Business)
            })
            .await;

        assert!(matches!(result, Err(TestError::Business)));
        assert_eq!(resource.active_handles().await, 0);
        let journal = resource.journal().await;
        assert!(matches!(journal.last(), Some(resource::ResourceCall::Commit(_))));
    }

    #[tokio::test]
    async fn test_nested_failure_surfaces_unexpected_rollback() {
        let (coordinator, _) = setup();
        let ctx = TransactionContext::new();

        let result: Result<(), TestError> = coordinator
            .execute(&ctx, &TransactionDefinition::required(), |ctx| {
                let coordinator = coordinator.clone();
                async move {
                    let inner: Result<(), TestError> = coordinator
                        .execute(&ctx, &TransactionDefinition::required(), |_| async {
                            Err(TestError::Fault)
                        })
                        .await;
                    assert!(inner.is_err());
                    Ok(())
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(TestError::Transaction(TransactionError::UnexpectedRollback { .. }))
        ));
    }

    #[tokio::test]
    async fn test_begin_failure_is_converted() {
        let (coordinator, resource) = setup();
        resource.set_fail_on_begin(true).await;
        let ctx = TransactionContext::new();

        let result: Result<(), TestError> = coordinator
            .execute(&ctx, &TransactionDefinition::required(), |_| async { Ok(()) })
            .await;

        assert!(matches!(
            result,
            Err(TestError::Transaction(TransactionError::ResourceUnavailable(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back() {
        let (coordinator, resource) = setup();
        let ctx = TransactionContext::new();
        let definition = TransactionDefinition::required().with_timeout(Duration::from_millis(10));

        let result: Result<(), TestError> = coordinator
            .execute(&ctx, &definition, |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(TestError::Transaction(TransactionError::TimedOut { .. }))
        ));
        assert!(!ctx.is_transaction_active());
        assert_eq!(resource.active_handles().await, 0);
    }

    #[tokio::test]
    async fn test_panic_rolls_back_and_resumes() {
        let (coordinator, resource) = setup();
        let ctx = TransactionContext::new();

        let task_ctx = ctx.clone();
        let task_coordinator = coordinator.clone();
        let joined = tokio::spawn(async move {
            let _: Result<(), TestError> = task_coordinator
                .execute(&task_ctx, &TransactionDefinition::required(), |_| async {
                    if should_panic() {
                        panic!("boom");
                    }
                    Ok(())
                })
                .await;
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert!(!ctx.is_transaction_active());
        assert_eq!(resource.active_handles().await, 0);
    }

    #[tokio::test]
    async fn test_business_failure_over_doomed_transaction_surfaces_unexpected_rollback() {
        let (coordinator, resource) = setup();
        let ctx = TransactionContext::new();

        let result: Result<(), TestError> = coordinator
            .execute(&ctx, &TransactionDefinition::required(), |ctx| {
                let coordinator = coordinator.clone();
                async move {
                    let _: Result<(), TestError> = coordinator
                        .execute(&ctx, &TransactionDefinition::required(), |_| async {
                            Err(TestError::Fault)
                        })
                        .await;
                    Err(TestError::Business)
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(TestError::Transaction(TransactionError::UnexpectedRollback { .. }))
        ));
        let journal = resource.journal().await;
        assert_eq!(journal.len(), 2);
        assert!(matches!(journal[1], resource::ResourceCall::Rollback(_)));
    }

    #[tokio::test]
    async fn test_nested_failure_keeps_block_error_when_owner_rolls_back() {
        let (coordinator, _) = setup();
        let ctx = TransactionContext::new();

        let result: Result<(), TestError> = coordinator
            .execute(&ctx, &TransactionDefinition::required(), |ctx| {
                let coordinator = coordinator.clone();
                async move {
                    let _: Result<(), TestError> = coordinator
                        .execute(&ctx, &TransactionDefinition::required(), |_| async {
                            Err(TestError::Fault)
                        })
                        .await;
                    Err(TestError::Fault)
                }
            })
            .await;

        assert!(matches!(result, Err(TestError::Fault)));
    }

    async fn wait_for_idle(resource: &InMemoryResource) {
        for _ in 0..100 {
            if resource.active_handles().await == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_dropped_outermost_helper_is_rolled_back_in_background() {
        let (coordinator, resource) = setup();

        // A call-chain that owns its context and is cancelled mid-flight,
        // as when a client disconnects from a request handler.
        let chain = {
            let coordinator = coordinator.clone();
            async move {
                let ctx = TransactionContext::new();
                coordinator
                    .execute(&ctx, &TransactionDefinition::required(), |ctx| {
                        let coordinator = coordinator.clone();
                        async move {
                            coordinator
                                .execute(&ctx, &TransactionDefinition::required(), |_| async {
                                    std::future::pending::<()>().await;
                                    Ok::<_, TestError>(())
                                })
                                .await
                        }
                    })
                    .await
            }
        };
        let _ = tokio::time::timeout(Duration::from_millis(10), chain).await;

        wait_for_idle(&resource).await;
        assert_eq!(resource.active_handles().await, 0);
        let journal = resource.journal().await;
        assert!(matches!(journal.last(), Some(resource::ResourceCall::Rollback(_))));
    }

    #[tokio::test]
    async fn test_dropped_helper_leaves_context_clean() {
        let (coordinator, resource) = setup();
        let ctx = TransactionContext::new();

        {
            let definition = TransactionDefinition::required();
            let pending = coordinator.execute(
                &ctx,
                &definition,
                |_| async {
                    std::future::pending::<()>().await;
                    Ok::<_, TestError>(())
                },
            );
            // Drive it until the frame is open, then drop it.
            let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;
        }

        wait_for_idle(&resource).await;
        assert!(!ctx.is_transaction_active());
        assert_eq!(resource.active_handles().await, 0);
        assert_eq!(coordinator.recover(&ctx).await.unwrap(), 0);
    }
}
