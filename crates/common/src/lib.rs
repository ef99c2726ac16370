//! Identifiers shared across the transaction coordinator crates.

pub mod types;

pub use types::{FrameId, HandleId};
