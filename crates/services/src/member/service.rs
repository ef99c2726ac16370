use std::time::Duration;

use coordinator::{Propagation, TransactionContext, TransactionCoordinator, TransactionDefinition};

use super::{Log, LogRepository, Member, MemberRepository};
use crate::Store;
use crate::error::{Result, ServiceError};

/// Registers members and records an audit log entry for each join.
#[derive(Clone)]
pub struct MemberService<S: Store> {
    coordinator: TransactionCoordinator<S>,
    members: MemberRepository<S>,
    logs: LogRepository<S>,
    timeout: Option<Duration>,
}

impl<S: Store> MemberService<S> {
    /// Creates a service whose log repository joins the caller's
    /// transaction.
    pub fn new(coordinator: TransactionCoordinator<S>) -> Self {
        Self::with_log_propagation(coordinator, Propagation::Required)
    }

    /// Creates a service whose log repository runs with `propagation`.
    pub fn with_log_propagation(
        coordinator: TransactionCoordinator<S>,
        propagation: Propagation,
    ) -> Self {
        Self {
            members: MemberRepository::new(coordinator.clone()),
            logs: LogRepository::new(coordinator.clone()).with_propagation(propagation),
            coordinator,
            timeout: None,
        }
    }

    /// Bounds the outer transaction of each join.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn members(&self) -> &MemberRepository<S> {
        &self.members
    }

    pub fn logs(&self) -> &LogRepository<S> {
        &self.logs
    }

    /// Saves the member and the log entry in one outer transaction.
    ///
    /// A failed log write is propagated, so the member is rolled back with
    /// it.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn join_v1(&self, ctx: &TransactionContext, username: &str) -> Result<Member> {
        validate_username(username)?;
        let definition = self.join_definition("member_service.join_v1");

        let member = self
            .coordinator
            .execute(ctx, &definition, |ctx| async move {
                let member = Member::new(username);
                tracing::info!("saving member");
                self.members.save(&ctx, &member).await?;
                tracing::info!("saving log entry");
                self.logs.save(&ctx, &Log::new(username)).await?;
                Ok::<_, ServiceError>(member)
            })
            .await?;

        metrics::counter!("members_joined_total").increment(1);
        Ok(member)
    }

    /// Saves the member and the log entry in one outer transaction and
    /// recovers from a failed log write.
    ///
    /// If the log repository joined the outer transaction, its failure has
    /// already doomed it and the join fails with an unexpected rollback.
    /// With `RequiresNew` only the log entry is lost.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn join_v2(&self, ctx: &TransactionContext, username: &str) -> Result<Member> {
        validate_username(username)?;
        let definition = self.join_definition("member_service.join_v2");

        let member = self
            .coordinator
            .execute(ctx, &definition, |ctx| async move {
                let member = Member::new(username);
                self.members.save(&ctx, &member).await?;

                if let Err(e) = self.logs.save(&ctx, &Log::new(username)).await {
                    tracing::warn!(error = %e, "log entry could not be saved, continuing");
                    metrics::counter!("member_log_failures_total").increment(1);
                }
                Ok::<_, ServiceError>(member)
            })
            .await?;

        metrics::counter!("members_joined_total").increment(1);
        Ok(member)
    }

    fn join_definition(&self, name: &str) -> TransactionDefinition {
        let mut definition = TransactionDefinition::required().with_name(name);
        definition.timeout = self.timeout;
        definition
    }

    /// Looks up a committed member.
    pub async fn find_member(&self, username: &str) -> Result<Option<Member>> {
        self.members.find(&TransactionContext::new(), username).await
    }

    /// Looks up a committed log entry.
    pub async fn find_log(&self, message: &str) -> Result<Option<Log>> {
        self.logs.find(&TransactionContext::new(), message).await
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(ServiceError::Validation(
            "Username must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource::InMemoryResource;

    fn service(propagation: Propagation) -> MemberService<InMemoryResource> {
        MemberService::with_log_propagation(
            TransactionCoordinator::new(InMemoryResource::new()),
            propagation,
        )
    }

    #[tokio::test]
    async fn test_empty_username_is_rejected_before_any_transaction() {
        let service = service(Propagation::Required);
        let ctx = TransactionContext::new();

        let err = service.join_v1(&ctx, "  ").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(
            service
                .coordinator
                .resource()
                .journal()
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_join_v1_uses_one_physical_transaction() {
        let service = service(Propagation::Required);
        let ctx = TransactionContext::new();

        service.join_v1(&ctx, "alice").await.unwrap();

        assert_eq!(service.coordinator.resource().journal().await.len(), 2);
    }

    #[tokio::test]
    async fn test_join_v1_log_failure_rolls_back_member() {
        let service = service(Propagation::Required);
        let ctx = TransactionContext::new();

        let err = service.join_v1(&ctx, "log-fail-unit").await.unwrap_err();

        assert!(matches!(err, ServiceError::LogWriteFailed { .. }));
        let journal = service.coordinator.resource().journal().await;
        assert_eq!(journal.len(), 2);
        assert!(matches!(journal[1], resource::ResourceCall::Rollback(_)));
    }

    #[tokio::test]
    async fn test_join_v2_uses_one_physical_transaction() {
        let service = service(Propagation::Required);
        let ctx = TransactionContext::new();

        service.join_v2(&ctx, "alice").await.unwrap();

        assert_eq!(service.coordinator.resource().journal().await.len(), 2);
        assert!(service.find_member("alice").await.unwrap().is_some());
        assert!(service.find_log("alice").await.unwrap().is_some());
    }
}
