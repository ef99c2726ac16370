use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    BeginOptions, HandleId, HandleState, ResourceCall, ResourceError, Result,
    manager::{RecordStore, ResourceManager, validate_record_key},
    retention::{DEFAULT_RETENTION, ResolvedHandles},
};

type RecordKey = (String, String);

#[derive(Debug, Default)]
struct HandleEntry {
    read_only: bool,
    /// Uncommitted writes; `None` marks a delete.
    staged: HashMap<RecordKey, Option<serde_json::Value>>,
}

#[derive(Debug)]
struct InMemoryState {
    committed: HashMap<RecordKey, serde_json::Value>,
    /// Active handles only; resolved ones move to `resolved`.
    handles: HashMap<HandleId, HandleEntry>,
    resolved: ResolvedHandles,
    journal: VecDeque<ResourceCall>,
    retention: usize,
    fail_on_begin: bool,
}

impl InMemoryState {
    fn with_retention(retention: usize) -> Self {
        Self {
            committed: HashMap::new(),
            handles: HashMap::new(),
            resolved: ResolvedHandles::with_capacity(retention),
            journal: VecDeque::new(),
            retention: retention.max(1),
            fail_on_begin: false,
        }
    }

    fn active_entry(&mut self, handle: HandleId) -> Result<&mut HandleEntry> {
        if !self.handles.contains_key(&handle) {
            return Err(self.resolved.missing(handle));
        }
        self.handles
            .get_mut(&handle)
            .ok_or(ResourceError::UnknownHandle(handle))
    }

    fn writable_entry(&mut self, handle: HandleId) -> Result<&mut HandleEntry> {
        let entry = self.active_entry(handle)?;
        if entry.read_only {
            return Err(ResourceError::ReadOnly(handle));
        }
        Ok(entry)
    }

    fn staged(&self, handle: HandleId) -> Result<&HashMap<RecordKey, Option<serde_json::Value>>> {
        self.handles
            .get(&handle)
            .map(|entry| &entry.staged)
            .ok_or_else(|| self.resolved.missing(handle))
    }

    fn read(&self, handle: Option<HandleId>, key: &RecordKey) -> Result<Option<serde_json::Value>> {
        if let Some(handle) = handle
            && let Some(staged) = self.staged(handle)?.get(key)
        {
            return Ok(staged.clone());
        }
        Ok(self.committed.get(key).cloned())
    }

    /// Removes an active handle and remembers its final state.
    fn resolve(&mut self, handle: HandleId, state: HandleState) -> Result<HandleEntry> {
        let entry = self
            .handles
            .remove(&handle)
            .ok_or_else(|| self.resolved.missing(handle))?;
        self.resolved.record(handle, state);
        Ok(entry)
    }

    fn log(&mut self, call: ResourceCall) {
        self.journal.push_back(call);
        while self.journal.len() > self.retention {
            self.journal.pop_front();
        }
    }
}

impl Default for InMemoryState {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

/// In-memory transactional resource for testing.
///
/// Each handle stages its writes privately; commit publishes them and
/// rollback discards them, so uncommitted data is never visible to other
/// handles or to handle-less reads. Every begin/commit/rollback is
/// recorded in a journal that tests can inspect.
///
/// Resolved handles and journal entries are kept up to a retention limit
/// ([`DEFAULT_RETENTION`] unless set with [`with_retention`](Self::with_retention)),
/// so a long-running process does not grow without bound.
#[derive(Clone, Default)]
pub struct InMemoryResource {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryResource {
    /// Creates a new empty in-memory resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resource that remembers at most `retention` resolved
    /// handles and journal entries.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryState::with_retention(retention))),
        }
    }

    /// Configures the resource to refuse new physical transactions.
    pub async fn set_fail_on_begin(&self, fail: bool) {
        self.state.write().await.fail_on_begin = fail;
    }

    /// Returns the most recent physical calls, oldest first.
    pub async fn journal(&self) -> Vec<ResourceCall> {
        self.state.read().await.journal.iter().copied().collect()
    }

    /// Returns the number of handles currently active.
    pub async fn active_handles(&self) -> usize {
        self.state.read().await.handles.len()
    }

    /// Returns the number of resolved handles still remembered.
    pub async fn resolved_handles(&self) -> usize {
        self.state.read().await.resolved.len()
    }

    /// Returns the total number of committed records.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.committed.len()
    }

    /// Clears all records, handles and the journal.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.committed.clear();
        state.handles.clear();
        state.resolved.clear();
        state.journal.clear();
    }
}

#[async_trait]
impl ResourceManager for InMemoryResource {
    async fn begin(&self, options: BeginOptions) -> Result<HandleId> {
        let mut state = self.state.write().await;

        if state.fail_on_begin {
            return Err(ResourceError::Unavailable(
                "in-memory resource is refusing new transactions".to_string(),
            ));
        }

        let handle = HandleId::new();
        state.handles.insert(
            handle,
            HandleEntry {
                read_only: options.read_only,
                staged: HashMap::new(),
            },
        );
        state.log(ResourceCall::Begin(handle));

        tracing::debug!(%handle, read_only = options.read_only, "physical begin");
        Ok(handle)
    }

    async fn commit(&self, handle: HandleId) -> Result<()> {
        let mut state = self.state.write().await;

        let entry = state.resolve(handle, HandleState::Committed)?;
        for (key, value) in entry.staged {
            match value {
                Some(value) => {
                    state.committed.insert(key, value);
                }
                None => {
                    state.committed.remove(&key);
                }
            }
        }
        state.log(ResourceCall::Commit(handle));

        tracing::debug!(%handle, "physical commit");
        Ok(())
    }

    async fn rollback(&self, handle: HandleId) -> Result<()> {
        let mut state = self.state.write().await;

        state.resolve(handle, HandleState::RolledBack)?;
        state.log(ResourceCall::Rollback(handle));

        tracing::debug!(%handle, "physical rollback");
        Ok(())
    }

    async fn handle_state(&self, handle: HandleId) -> Result<HandleState> {
        let state = self.state.read().await;
        if state.handles.contains_key(&handle) {
            return Ok(HandleState::Active);
        }
        state
            .resolved
            .get(handle)
            .ok_or(ResourceError::UnknownHandle(handle))
    }
}

#[async_trait]
impl RecordStore for InMemoryResource {
    async fn put(
        &self,
        handle: HandleId,
        table: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        validate_record_key(table, key)?;
        let mut state = self.state.write().await;
        let entry = state.writable_entry(handle)?;
        entry
            .staged
            .insert((table.to_string(), key.to_string()), Some(value));
        Ok(())
    }

    async fn delete(&self, handle: HandleId, table: &str, key: &str) -> Result<bool> {
        validate_record_key(table, key)?;
        let record_key = (table.to_string(), key.to_string());
        let mut state = self.state.write().await;

        let existed = state.read(Some(handle), &record_key)?.is_some();
        let entry = state.writable_entry(handle)?;
        entry.staged.insert(record_key, None);
        Ok(existed)
    }

    async fn get(
        &self,
        handle: Option<HandleId>,
        table: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        validate_record_key(table, key)?;
        let state = self.state.read().await;
        state.read(handle, &(table.to_string(), key.to_string()))
    }

    async fn count(&self, handle: Option<HandleId>, table: &str) -> Result<usize> {
        let state = self.state.read().await;

        let staged = match handle {
            Some(handle) => Some(state.staged(handle)?),
            None => None,
        };

        let mut count = state
            .committed
            .keys()
            .filter(|(t, k)| {
                t == table
                    && staged
                        .and_then(|s| s.get(&(t.clone(), k.clone())))
                        .is_none_or(|v| v.is_some())
            })
            .count();

        if let Some(staged) = staged {
            count += staged
                .iter()
                .filter(|((t, _), v)| t == table && v.is_some())
                .filter(|(key, _)| !state.committed.contains_key(*key))
                .count();
        }

        Ok(count)
    }
}
