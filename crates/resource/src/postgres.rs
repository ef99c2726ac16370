use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::{
    BeginOptions, HandleId, HandleState, ResourceError, Result,
    manager::{RecordStore, ResourceManager, validate_record_key},
    retention::ResolvedHandles,
};

/// The open database transaction of one handle.
///
/// Locked per handle, so one call-chain's queries never wait on another's.
struct PgSlot {
    state: HandleState,
    tx: Option<Transaction<'static, Postgres>>,
}

type SharedSlot = Arc<Mutex<PgSlot>>;

#[derive(Default)]
struct PgHandles {
    active: HashMap<HandleId, SharedSlot>,
    resolved: ResolvedHandles,
}

/// PostgreSQL-backed resource.
///
/// Every handle owns one pooled connection with an open database
/// transaction until it is committed or rolled back. The handle registry
/// is only locked to look a handle up, never across a query.
#[derive(Clone)]
pub struct PostgresResource {
    pool: PgPool,
    handles: Arc<Mutex<PgHandles>>,
}

impl PostgresResource {
    /// Creates a new PostgreSQL resource.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            handles: Arc::new(Mutex::new(PgHandles::default())),
        }
    }

    /// Connects to the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Returns the number of handles currently active.
    pub async fn active_handles(&self) -> usize {
        self.handles.lock().await.active.len()
    }

    async fn slot(&self, handle: HandleId) -> Result<SharedSlot> {
        let handles = self.handles.lock().await;
        handles
            .active
            .get(&handle)
            .cloned()
            .ok_or_else(|| handles.resolved.missing(handle))
    }

    /// Unregisters an active handle and takes its open transaction.
    async fn take_active(
        &self,
        handle: HandleId,
        resolved: HandleState,
    ) -> Result<Transaction<'static, Postgres>> {
        let slot = {
            let mut handles = self.handles.lock().await;
            let Some(slot) = handles.active.remove(&handle) else {
                return Err(handles.resolved.missing(handle));
            };
            handles.resolved.record(handle, resolved);
            slot
        };

        let mut slot = slot.lock().await;
        slot.state = resolved;
        slot.tx.take().ok_or(ResourceError::InvalidHandleState {
            handle,
            state: resolved,
        })
    }
}

#[async_trait]
impl ResourceManager for PostgresResource {
    async fn begin(&self, options: BeginOptions) -> Result<HandleId> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ResourceError::Unavailable(e.to_string()))?;

        if options.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await?;
        }

        let handle = HandleId::new();
        let slot = PgSlot {
            state: HandleState::Active,
            tx: Some(tx),
        };
        self.handles
            .lock()
            .await
            .active
            .insert(handle, Arc::new(Mutex::new(slot)));

        tracing::debug!(%handle, read_only = options.read_only, "physical begin");
        Ok(handle)
    }

    async fn commit(&self, handle: HandleId) -> Result<()> {
        let tx = self.take_active(handle, HandleState::Committed).await?;
        tx.commit().await?;
        tracing::debug!(%handle, "physical commit");
        Ok(())
    }

    async fn rollback(&self, handle: HandleId) -> Result<()> {
        let tx = self.take_active(handle, HandleState::RolledBack).await?;
        tx.rollback().await?;
        tracing::debug!(%handle, "physical rollback");
        Ok(())
    }

    async fn handle_state(&self, handle: HandleId) -> Result<HandleState> {
        let handles = self.handles.lock().await;
        if handles.active.contains_key(&handle) {
            return Ok(HandleState::Active);
        }
        handles
            .resolved
            .get(handle)
            .ok_or(ResourceError::UnknownHandle(handle))
    }
}

#[async_trait]
impl RecordStore for PostgresResource {
    async fn put(
        &self,
        handle: HandleId,
        table: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        validate_record_key(table, key)?;
        let slot = self.slot(handle).await?;
        let mut slot = slot.lock().await;
        let tx = active_tx(&mut slot, handle)?;

        sqlx::query(
            r#"
            INSERT INTO records (table_name, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (table_name, key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(table)
        .bind(key)
        .bind(value)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.code().as_deref() == Some("25006")
            {
                return ResourceError::ReadOnly(handle);
            }
            ResourceError::Database(e)
        })?;

        Ok(())
    }

    async fn delete(&self, handle: HandleId, table: &str, key: &str) -> Result<bool> {
        validate_record_key(table, key)?;
        let slot = self.slot(handle).await?;
        let mut slot = slot.lock().await;
        let tx = active_tx(&mut slot, handle)?;

        let result = sqlx::query("DELETE FROM records WHERE table_name = $1 AND key = $2")
            .bind(table)
            .bind(key)
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(
        &self,
        handle: Option<HandleId>,
        table: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        validate_record_key(table, key)?;
        let query = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT value FROM records WHERE table_name = $1 AND key = $2",
        )
        .bind(table)
        .bind(key);

        let value = match handle {
            Some(handle) => {
                let slot = self.slot(handle).await?;
                let mut slot = slot.lock().await;
                let tx = active_tx(&mut slot, handle)?;
                query.fetch_optional(&mut **tx).await?
            }
            None => query.fetch_optional(&self.pool).await?,
        };

        Ok(value)
    }

    async fn count(&self, handle: Option<HandleId>, table: &str) -> Result<usize> {
        let query =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM records WHERE table_name = $1")
                .bind(table);

        let count = match handle {
            Some(handle) => {
                let slot = self.slot(handle).await?;
                let mut slot = slot.lock().await;
                let tx = active_tx(&mut slot, handle)?;
                query.fetch_one(&mut **tx).await?
            }
            None => query.fetch_one(&self.pool).await?,
        };

        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn active_tx(slot: &mut PgSlot, handle: HandleId) -> Result<&mut Transaction<'static, Postgres>> {
    let state = slot.state;
    match slot.tx.as_mut() {
        Some(tx) if state.is_active() => Ok(tx),
        _ => Err(ResourceError::InvalidHandleState { handle, state }),
    }
}
