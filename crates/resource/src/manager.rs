use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{BeginOptions, HandleId, HandleState, ResourceError, Result};

/// Core trait for transactional resources.
///
/// A resource issues physical transaction handles and resolves them.
/// Handles are owned by whoever called `begin` until they are committed
/// or rolled back; after that their identity is never reused.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Opens a new physical transaction and returns its handle.
    async fn begin(&self, options: BeginOptions) -> Result<HandleId>;

    /// Commits the physical transaction.
    ///
    /// Fails with `InvalidHandleState` if the handle is not `Active`.
    async fn commit(&self, handle: HandleId) -> Result<()>;

    /// Rolls back the physical transaction.
    ///
    /// Fails with `InvalidHandleState` if the handle is not `Active`.
    async fn rollback(&self, handle: HandleId) -> Result<()>;

    /// Returns the current state of a handle.
    async fn handle_state(&self, handle: HandleId) -> Result<HandleState>;
}

/// Record reads and writes scoped to a transaction handle.
///
/// Writes always need an active handle. Reads may pass `None` to see
/// committed data only, without opening a transaction.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces a record.
    async fn put(
        &self,
        handle: HandleId,
        table: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()>;

    /// Deletes a record. Returns true if it existed.
    async fn delete(&self, handle: HandleId, table: &str, key: &str) -> Result<bool>;

    /// Reads a record, seeing the handle's own uncommitted writes if a
    /// handle is given.
    async fn get(
        &self,
        handle: Option<HandleId>,
        table: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>>;

    /// Counts the records of a table.
    async fn count(&self, handle: Option<HandleId>, table: &str) -> Result<usize>;
}

/// Extension trait providing typed access to records.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Serializes and writes a record.
    async fn put_json<T: Serialize + Sync>(
        &self,
        handle: HandleId,
        table: &str,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.put(handle, table, key, value).await
    }

    /// Reads and deserializes a record.
    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        handle: Option<HandleId>,
        table: &str,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(handle, table, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Checks if a record exists.
    async fn exists(&self, handle: Option<HandleId>, table: &str, key: &str) -> Result<bool> {
        Ok(self.get(handle, table, key).await?.is_some())
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}

/// Validates a table name and key before they reach a backend.
pub fn validate_record_key(table: &str, key: &str) -> Result<()> {
    if table.is_empty() {
        return Err(ResourceError::InvalidKey(
            "Table name must not be empty".to_string(),
        ));
    }
    if !table
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ResourceError::InvalidKey(format!(
            "Table name '{table}' may only contain ASCII letters, digits and '_'"
        )));
    }
    if key.is_empty() {
        return Err(ResourceError::InvalidKey(
            "Record key must not be empty".to_string(),
        ));
    }
    Ok(())
}
