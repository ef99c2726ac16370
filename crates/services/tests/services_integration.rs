//! Integration tests for the member and order services.

use coordinator::{Propagation, TransactionContext, TransactionCoordinator, TransactionDefinition};
use resource::{InMemoryResource, ResourceCall};
use services::{
    MemberService, NOT_ENOUGH_MONEY, Order, OrderError, OrderService, PayState, ServiceError,
};

struct TestHarness {
    resource: InMemoryResource,
    coordinator: TransactionCoordinator<InMemoryResource>,
}

impl TestHarness {
    fn new() -> Self {
        let resource = InMemoryResource::new();
        let coordinator = TransactionCoordinator::new(resource.clone());
        Self {
            resource,
            coordinator,
        }
    }

    fn members(&self, log_propagation: Propagation) -> MemberService<InMemoryResource> {
        MemberService::with_log_propagation(self.coordinator.clone(), log_propagation)
    }

    fn orders(&self) -> OrderService<InMemoryResource> {
        OrderService::new(self.coordinator.clone())
    }
}

// --- members ---

#[tokio::test]
async fn test_join_v1_success_saves_member_and_log() {
    let h = TestHarness::new();
    let service = h.members(Propagation::Required);
    let ctx = TransactionContext::new();

    let member = service.join_v1(&ctx, "success").await.unwrap();

    assert_eq!(member.username, "success");
    assert_eq!(
        service.find_member("success").await.unwrap().unwrap().username,
        "success"
    );
    assert_eq!(
        service.find_log("success").await.unwrap().unwrap().message,
        "success"
    );
}

#[tokio::test]
async fn test_join_v1_log_failure_rolls_back_member_and_log() {
    let h = TestHarness::new();
    let service = h.members(Propagation::Required);
    let ctx = TransactionContext::new();

    let err = service.join_v1(&ctx, "log-fail-v1").await.unwrap_err();

    assert!(matches!(err, ServiceError::LogWriteFailed { .. }));
    assert!(service.find_member("log-fail-v1").await.unwrap().is_none());
    assert!(service.find_log("log-fail-v1").await.unwrap().is_none());
    assert!(!ctx.is_transaction_active());
}

#[tokio::test]
async fn test_join_v1_with_requires_new_log_still_rolls_back_member() {
    let h = TestHarness::new();
    let service = h.members(Propagation::RequiresNew);
    let ctx = TransactionContext::new();

    let err = service.join_v1(&ctx, "log-fail-v1-new").await.unwrap_err();

    assert!(matches!(err, ServiceError::LogWriteFailed { .. }));
    assert!(service.find_member("log-fail-v1-new").await.unwrap().is_none());
    assert_eq!(h.resource.active_handles().await, 0);
}

#[tokio::test]
async fn test_join_v2_success_commits_both_in_one_transaction() {
    let h = TestHarness::new();
    let service = h.members(Propagation::Required);
    let ctx = TransactionContext::new();

    service.join_v2(&ctx, "bob").await.unwrap();

    let journal = h.resource.journal().await;
    assert_eq!(journal.len(), 2);
    assert!(matches!(journal[1], ResourceCall::Commit(_)));
    assert!(service.find_member("bob").await.unwrap().is_some());
    assert!(service.find_log("bob").await.unwrap().is_some());
}

#[tokio::test]
async fn test_join_v2_recovered_log_failure_raises_unexpected_rollback() {
    let h = TestHarness::new();
    let service = h.members(Propagation::Required);
    let ctx = TransactionContext::new();

    let err = service.join_v2(&ctx, "log-fail-v2").await.unwrap_err();

    assert!(err.is_unexpected_rollback());
    assert!(service.find_member("log-fail-v2").await.unwrap().is_none());
    assert!(service.find_log("log-fail-v2").await.unwrap().is_none());
    assert!(!ctx.is_transaction_active());
}

#[tokio::test]
async fn test_join_v2_with_requires_new_log_keeps_member() {
    let h = TestHarness::new();
    let service = h.members(Propagation::RequiresNew);
    let ctx = TransactionContext::new();

    let member = service.join_v2(&ctx, "log-fail-v3").await.unwrap();

    assert_eq!(member.username, "log-fail-v3");
    assert!(service.find_member("log-fail-v3").await.unwrap().is_some());
    assert!(service.find_log("log-fail-v3").await.unwrap().is_none());

    let journal = h.resource.journal().await;
    let outer = journal[0].handle();
    assert_eq!(journal.len(), 4);
    assert!(matches!(journal[1], ResourceCall::Begin(inner) if inner != outer));
    assert!(matches!(journal[2], ResourceCall::Rollback(_)));
    assert_eq!(journal[3], ResourceCall::Commit(outer));
}

#[tokio::test]
async fn test_join_v2_inside_caller_transaction_joins_it() {
    let h = TestHarness::new();
    let service = h.members(Propagation::Required);
    let ctx = TransactionContext::new();

    let result: Result<(), ServiceError> = h
        .coordinator
        .execute(&ctx, &TransactionDefinition::required(), |ctx| {
            let service = service.clone();
            async move {
                service.join_v2(&ctx, "carol").await?;
                service.join_v2(&ctx, "dave").await?;
                Ok(())
            }
        })
        .await;

    result.unwrap();
    assert_eq!(h.resource.journal().await.len(), 2);
    assert!(service.find_member("carol").await.unwrap().is_some());
    assert!(service.find_member("dave").await.unwrap().is_some());
}

// --- orders ---

#[tokio::test]
async fn test_order_complete() {
    let h = TestHarness::new();
    let service = h.orders();
    let ctx = TransactionContext::new();

    let order = service.order(&ctx, Order::new("alice")).await.unwrap();

    assert_eq!(order.pay_state, Some(PayState::Complete));
    let stored = service.find(order.id).await.unwrap().unwrap();
    assert_eq!(stored.pay_state, Some(PayState::Complete));
}

#[tokio::test]
async fn test_order_system_fault_rolls_back() {
    let h = TestHarness::new();
    let service = h.orders();
    let ctx = TransactionContext::new();
    let order = Order::new("fail");
    let id = order.id;

    let err = service.order(&ctx, order).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Order(OrderError::PaymentFailed { .. })
    ));
    assert!(service.find(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_order_not_enough_money_commits_waiting_order() {
    let h = TestHarness::new();
    let service = h.orders();
    let ctx = TransactionContext::new();
    let order = Order::new("not-enough-money");
    let id = order.id;

    let err = service.order(&ctx, order).await.unwrap_err();

    match err {
        ServiceError::Order(e @ OrderError::NotEnoughMoney { .. }) => assert_eq!(e.order_id(), id),
        other => panic!("unexpected error: {other}"),
    }
    let stored = service.find(id).await.unwrap().unwrap();
    assert_eq!(stored.pay_state, Some(PayState::Waiting));
}

#[tokio::test]
async fn test_order_not_enough_money_rolls_back_with_override() {
    let h = TestHarness::new();
    let service = h.orders().with_definition(
        TransactionDefinition::required()
            .with_name("order_service.order")
            .with_rollback_for(NOT_ENOUGH_MONEY),
    );
    let ctx = TransactionContext::new();
    let order = Order::new("not-enough-money");
    let id = order.id;

    let err = service.order(&ctx, order).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Order(OrderError::NotEnoughMoney { .. })
    ));
    assert!(service.find(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_order_uses_single_physical_transaction() {
    let h = TestHarness::new();
    let service = h.orders();
    let ctx = TransactionContext::new();

    service.order(&ctx, Order::new("alice")).await.unwrap();

    // Repository saves join the service's transaction.
    let journal = h.resource.journal().await;
    assert_eq!(journal.len(), 2);
    assert_eq!(journal[0].handle(), journal[1].handle());
}
