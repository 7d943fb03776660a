mod handlers;

use crate::scheduler::SchedulerContext;
use axum::{Router, routing::get};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<SchedulerContext>,
}

/// Create the liveness router
pub fn create_router(state: AppState) -> Router {
    tracing::debug!(target: "api", "Creating API router");

    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
