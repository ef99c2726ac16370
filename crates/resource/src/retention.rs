use std::collections::{HashMap, VecDeque};

use crate::{HandleId, HandleState, ResourceError};

/// Default number of resolved handles and journal entries a backend keeps.
pub const DEFAULT_RETENTION: usize = 1024;

/// Terminal states of recently resolved handles.
///
/// Backends drop a handle's working state as soon as it is resolved and
/// remember only its final state here, so late calls through it still
/// fail with `InvalidHandleState`. The oldest entries are evicted once
/// `capacity` is reached; calls through an evicted handle fail with
/// `UnknownHandle`.
#[derive(Debug)]
pub(crate) struct ResolvedHandles {
    capacity: usize,
    order: VecDeque<HandleId>,
    states: HashMap<HandleId, HandleState>,
}

impl ResolvedHandles {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            states: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, handle: HandleId, state: HandleState) {
        debug_assert!(state.is_terminal());
        if self.states.insert(handle, state).is_none() {
            self.order.push_back(handle);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    pub(crate) fn get(&self, handle: HandleId) -> Option<HandleState> {
        self.states.get(&handle).copied()
    }

    /// Error for a call through a handle that is no longer active.
    pub(crate) fn missing(&self, handle: HandleId) -> ResourceError {
        match self.get(handle) {
            Some(state) => ResourceError::InvalidHandleState { handle, state },
            None => ResourceError::UnknownHandle(handle),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.states.clear();
    }
}

impl Default for ResolvedHandles {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETENTION)
    }
}
