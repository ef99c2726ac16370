use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one physical transaction handle issued by a resource.
///
/// Wraps a UUID so handle identities can never be confused with
/// other UUID-based identifiers, and so a resolved handle's identity
/// is never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(Uuid);

impl HandleId {
    /// Creates a new random handle ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a handle ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for HandleId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<HandleId> for Uuid {
    fn from(id: HandleId) -> Self {
        id.0
    }
}

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one transaction frame (one logical unit of work).
///
/// Frame IDs are monotonic across the process, so a stale ID from a
/// finished unit of work can never match a newer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(u64);

impl FrameId {
    /// Allocates the next frame ID.
    pub fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a frame ID from a raw value.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_id_new_creates_unique_ids() {
        let id1 = HandleId::new();
        let id2 = HandleId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn handle_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = HandleId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn handle_id_serializes_as_plain_uuid() {
        let id = HandleId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn frame_ids_are_monotonic() {
        let a = FrameId::next();
        let b = FrameId::next();
        let c = FrameId::next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn frame_id_display() {
        assert_eq!(FrameId::from_raw(7).to_string(), "#7");
    }
}
