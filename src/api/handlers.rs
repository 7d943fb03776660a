use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;

/// Body of `GET /health`
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Scheduler loop has not been asked to stop
    pub running: bool,
    /// A transfer subprocess is in flight
    pub syncing: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let response = HealthResponse {
        status: "healthy",
        running: state.ctx.is_running(),
        syncing: state.ctx.is_syncing(),
    };
    tracing::debug!(
        target: "api::health",
        running = response.running,
        syncing = response.syncing,
        "Health check requested"
    );
    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerContext;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState {
            ctx: Arc::new(SchedulerContext::new()),
        }
    }

    #[tokio::test]
    async fn test_health_reports_idle_loop() {
        let Json(body) = health_check(State(state())).await;
        assert_eq!(
            body,
            HealthResponse {
                status: "healthy",
                running: true,
                syncing: false,
            }
        );
    }

    #[tokio::test]
    async fn test_health_reports_transfer_and_shutdown() {
        let state = state();
        let _registration = state.ctx.slot().occupy(None);
        let Json(body) = health_check(State(state.clone())).await;
        assert!(body.syncing);

        state.ctx.shutdown();
        let Json(body) = health_check(State(state.clone())).await;
        assert!(!body.running);
    }

    #[test]
    fn test_wire_format() {
        let body = HealthResponse {
            status: "healthy",
            running: true,
            syncing: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"status": "healthy", "running": true, "syncing": false})
        );
    }
}
