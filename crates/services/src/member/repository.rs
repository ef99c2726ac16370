use coordinator::{Propagation, TransactionContext, TransactionCoordinator, TransactionDefinition};
use resource::RecordStoreExt;

use super::{Log, Member};
use crate::Store;
use crate::error::{Result, ServiceError};

pub const MEMBERS_TABLE: &str = "members";
pub const LOGS_TABLE: &str = "logs";

/// Persists members. Saves join the caller's transaction.
#[derive(Clone)]
pub struct MemberRepository<S: Store> {
    coordinator: TransactionCoordinator<S>,
}

impl<S: Store> MemberRepository<S> {
    pub fn new(coordinator: TransactionCoordinator<S>) -> Self {
        Self { coordinator }
    }

    #[tracing::instrument(skip(self, ctx, member), fields(username = %member.username))]
    pub async fn save(&self, ctx: &TransactionContext, member: &Member) -> Result<()> {
        let definition = TransactionDefinition::required().with_name("member_repository.save");
        self.coordinator
            .execute(ctx, &definition, |ctx| async move {
                let handle = ctx.require_handle()?;
                self.coordinator
                    .resource()
                    .put_json(handle, MEMBERS_TABLE, &member.username, member)
                    .await?;
                tracing::info!("member saved");
                Ok(())
            })
            .await
    }

    /// Looks up a member. Outside a transaction only committed members
    /// are visible.
    pub async fn find(&self, ctx: &TransactionContext, username: &str) -> Result<Option<Member>> {
        Ok(self
            .coordinator
            .resource()
            .get_json(ctx.current_handle(), MEMBERS_TABLE, username)
            .await?)
    }
}

/// Persists audit log entries.
///
/// Runs `Required` by default; switch to `RequiresNew` to keep a failed
/// log write from dooming the caller's transaction.
#[derive(Clone)]
pub struct LogRepository<S: Store> {
    coordinator: TransactionCoordinator<S>,
    propagation: Propagation,
}

impl<S: Store> LogRepository<S> {
    pub fn new(coordinator: TransactionCoordinator<S>) -> Self {
        Self {
            coordinator,
            propagation: Propagation::Required,
        }
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Writes a log entry.
    ///
    /// The entry is written before the failure check, so a poisoned
    /// message leaves a write that must be rolled back.
    #[tracing::instrument(
        skip(self, ctx, log),
        fields(message = %log.message, propagation = %self.propagation)
    )]
    pub async fn save(&self, ctx: &TransactionContext, log: &Log) -> Result<()> {
        let definition =
            TransactionDefinition::new(self.propagation).with_name("log_repository.save");
        self.coordinator
            .execute(ctx, &definition, |ctx| async move {
                let handle = ctx.require_handle()?;
                self.coordinator
                    .resource()
                    .put_json(handle, LOGS_TABLE, &log.message, log)
                    .await?;
                tracing::info!("log entry saved");

                if log.is_poisoned() {
                    return Err(ServiceError::LogWriteFailed {
                        message: log.message.clone(),
                    });
                }
                Ok(())
            })
            .await
    }

    pub async fn find(&self, ctx: &TransactionContext, message: &str) -> Result<Option<Log>> {
        Ok(self
            .coordinator
            .resource()
            .get_json(ctx.current_handle(), LOGS_TABLE, message)
            .await?)
    }
}
