//! HTTP API server over the transactional services.
//!
//! Provides REST endpoints for member registration and order placement,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use coordinator::{Propagation, TransactionCoordinator, TransactionDefinition};
use metrics_exporter_prometheus::PrometheusHandle;
use services::{MemberService, OrderService, Store};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/members", post(routes::members::join::<S>))
        .route("/members/{username}", get(routes::members::get::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with services over `store`.
///
/// `tx_timeout` bounds the outer transaction of every service call.
pub fn create_default_state<S: Store>(
    store: S,
    backend: &'static str,
    tx_timeout: Option<Duration>,
) -> Arc<AppState<S>> {
    let coordinator = TransactionCoordinator::new(store);

    let mut members = MemberService::new(coordinator.clone());
    let mut members_isolated_log =
        MemberService::with_log_propagation(coordinator.clone(), Propagation::RequiresNew);
    let mut order_definition = TransactionDefinition::required().with_name("order_service.order");

    if let Some(timeout) = tx_timeout {
        members = members.with_timeout(timeout);
        members_isolated_log = members_isolated_log.with_timeout(timeout);
        order_definition = order_definition.with_timeout(timeout);
    }

    Arc::new(AppState {
        members,
        members_isolated_log,
        orders: OrderService::new(coordinator).with_definition(order_definition),
        backend,
    })
}
