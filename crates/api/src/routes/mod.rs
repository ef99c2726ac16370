//! HTTP route handlers and shared state.

pub mod health;
pub mod members;
pub mod metrics;
pub mod orders;

use std::future::Future;

use services::{MemberService, OrderService, ServiceError, Store};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    /// Member service whose log writes join the join transaction.
    pub members: MemberService<S>,
    /// Member service whose log writes run in their own transaction.
    pub members_isolated_log: MemberService<S>,
    pub orders: OrderService<S>,
    /// Name of the storage backend, reported by `/health`.
    pub backend: &'static str,
}

/// Runs a service call on its own task.
///
/// Axum drops a handler's future when the client disconnects; the spawned
/// call still runs to completion, so its transaction is always ended by
/// the call itself.
pub(crate) async fn run_to_completion<T, F>(work: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ServiceError>> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::spawn(work).await??)
}
