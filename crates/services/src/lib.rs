//! Business services built on the transaction coordinator.
//!
//! - Member registration with an audit log, where the log repository can
//!   join the caller's transaction or run in its own
//! - Order placement, where a lack of funds is a business signal that
//!   still commits the order

pub mod error;
pub mod member;
pub mod order;

use resource::{RecordStore, ResourceManager};

pub use error::{Result, ServiceError};
pub use member::{Log, LogRepository, Member, MemberRepository, MemberService};
pub use order::{
    NOT_ENOUGH_MONEY, Order, OrderError, OrderRepository, OrderService, PayState,
};

/// Backend a service runs its transactions and record operations against.
pub trait Store: ResourceManager + RecordStore + Clone + 'static {}

impl<T: ResourceManager + RecordStore + Clone + 'static> Store for T {}
