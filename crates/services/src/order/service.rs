use coordinator::{TransactionContext, TransactionCoordinator, TransactionDefinition};
use uuid::Uuid;

use super::{Order, OrderError, OrderRepository, PayState, triggers};
use crate::Store;
use crate::error::{Result, ServiceError};

/// Places orders and processes their payment in one transaction.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    coordinator: TransactionCoordinator<S>,
    orders: OrderRepository<S>,
    definition: TransactionDefinition,
}

impl<S: Store> OrderService<S> {
    pub fn new(coordinator: TransactionCoordinator<S>) -> Self {
        Self {
            orders: OrderRepository::new(coordinator.clone()),
            coordinator,
            definition: TransactionDefinition::required().with_name("order_service.order"),
        }
    }

    /// Replaces the transaction settings of `order`, e.g. to roll back
    /// on `NOT_ENOUGH_MONEY`.
    pub fn with_definition(mut self, definition: TransactionDefinition) -> Self {
        self.definition = definition;
        self
    }

    pub fn orders(&self) -> &OrderRepository<S> {
        &self.orders
    }

    /// Saves the order and processes its payment.
    ///
    /// - A payment system failure rolls the order back.
    /// - Lack of funds keeps the order with `PayState::Waiting` and returns
    ///   `OrderError::NotEnoughMoney`, unless the definition lists that
    ///   signal for rollback.
    /// - Otherwise the order is stored with `PayState::Complete`.
    #[tracing::instrument(
        skip(self, ctx, order),
        fields(order_id = %order.id, username = %order.username)
    )]
    pub async fn order(&self, ctx: &TransactionContext, order: Order) -> Result<Order> {
        let result: Result<Order> = self
            .coordinator
            .execute(ctx, &self.definition, |ctx| async move {
                let mut order = order;
                tracing::info!("saving order");
                self.orders.save(&ctx, &order).await?;

                tracing::info!("processing payment");
                match order.username.as_str() {
                    triggers::SYSTEM_FAULT => {
                        tracing::warn!("payment system failure");
                        return Err(OrderError::PaymentFailed { order_id: order.id }.into());
                    }
                    triggers::NOT_ENOUGH_MONEY => {
                        tracing::info!("not enough money, payment set to waiting");
                        order.pay_state = Some(PayState::Waiting);
                        self.orders.save(&ctx, &order).await?;
                        return Err(OrderError::NotEnoughMoney { order_id: order.id }.into());
                    }
                    _ => {
                        order.pay_state = Some(PayState::Complete);
                        self.orders.save(&ctx, &order).await?;
                    }
                }
                tracing::info!("payment complete");
                Ok::<_, ServiceError>(order)
            })
            .await;

        let outcome = match &result {
            Ok(_) => "complete",
            Err(ServiceError::Order(OrderError::NotEnoughMoney { .. })) => "waiting",
            Err(_) => "failed",
        };
        metrics::counter!("orders_placed_total", "outcome" => outcome).increment(1);
        result
    }

    /// Looks up a committed order.
    pub async fn find(&self, id: Uuid) -> Result<Option<Order>> {
        self.orders.find_by_id(&TransactionContext::new(), id).await
    }
}
