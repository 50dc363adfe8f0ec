//! API route definitions

use crate::handlers::health;
use crate::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Routes mounted under `/api/v1`
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/liveness", get(health::liveness))
}
