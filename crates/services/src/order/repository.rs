use coordinator::{TransactionContext, TransactionCoordinator, TransactionDefinition};
use resource::RecordStoreExt;
use uuid::Uuid;

use super::Order;
use crate::Store;
use crate::error::Result;

pub const ORDERS_TABLE: &str = "orders";

/// Persists orders. Saves join the caller's transaction.
#[derive(Clone)]
pub struct OrderRepository<S: Store> {
    coordinator: TransactionCoordinator<S>,
}

impl<S: Store> OrderRepository<S> {
    pub fn new(coordinator: TransactionCoordinator<S>) -> Self {
        Self { coordinator }
    }

    #[tracing::instrument(skip(self, ctx, order), fields(order_id = %order.id))]
    pub async fn save(&self, ctx: &TransactionContext, order: &Order) -> Result<()> {
        let definition = TransactionDefinition::required().with_name("order_repository.save");
        self.coordinator
            .execute(ctx, &definition, |ctx| async move {
                let handle = ctx.require_handle()?;
                self.coordinator
                    .resource()
                    .put_json(handle, ORDERS_TABLE, &order.id.to_string(), order)
                    .await?;
                Ok(())
            })
            .await
    }

    pub async fn find_by_id(&self, ctx: &TransactionContext, id: Uuid) -> Result<Option<Order>> {
        Ok(self
            .coordinator
            .resource()
            .get_json(ctx.current_handle(), ORDERS_TABLE, &id.to_string())
            .await?)
    }
}
