pub mod error;
pub mod handle;
pub mod manager;
pub mod memory;
pub mod postgres;
mod retention;

pub use common::HandleId;
pub use error::{ResourceError, Result};
pub use handle::{BeginOptions, HandleState, ResourceCall};
pub use manager::{RecordStore, RecordStoreExt, ResourceManager, validate_record_key};
pub use memory::InMemoryResource;
pub use postgres::PostgresResource;
pub use retention::DEFAULT_RETENTION;
