//! Order placement with payment.

mod repository;
mod service;
mod state;

use chrono::{DateTime, Utc};
use coordinator::{Classify, FailureCategory, SignalKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use repository::{ORDERS_TABLE, OrderRepository};
pub use service::OrderService;
pub use state::PayState;

/// Business signal raised when the customer cannot pay.
pub const NOT_ENOUGH_MONEY: SignalKind = SignalKind::new("not_enough_money");

/// Usernames that trigger payment outcomes.
pub mod triggers {
    /// Payment fails with a system fault; the order is rolled back.
    pub const SYSTEM_FAULT: &str = "fail";
    /// Payment is refused for lack of funds; the order is kept waiting.
    pub const NOT_ENOUGH_MONEY: &str = "not-enough-money";
}

/// An order placed by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub username: String,
    pub pay_state: Option<PayState>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            pay_state: None,
            created_at: Utc::now(),
        }
    }
}

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The customer's balance is insufficient. The order is kept with
    /// its payment waiting.
    #[error("Not enough money to pay for order {order_id}")]
    NotEnoughMoney { order_id: Uuid },

    /// Payment failed unexpectedly.
    #[error("Payment system failure for order {order_id}")]
    PaymentFailed { order_id: Uuid },
}

impl OrderError {
    pub fn order_id(&self) -> Uuid {
        match self {
            OrderError::NotEnoughMoney { order_id } | OrderError::PaymentFailed { order_id } => {
                *order_id
            }
        }
    }
}

impl Classify for OrderError {
    fn failure_category(&self) -> FailureCategory {
        match self {
            OrderError::NotEnoughMoney { .. } => FailureCategory::BusinessSignal(NOT_ENOUGH_MONEY),
            OrderError::PaymentFailed { .. } => FailureCategory::SystemFault,
        }
    }
}
