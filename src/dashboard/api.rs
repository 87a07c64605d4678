//! Dashboard HTTP API
//!
//! Read-only endpoints over the latest engine snapshot.

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use super::DashboardMemory;
use crate::engine::BotEngineState;

/// Create the API router
pub fn create_router(memory: Arc<DashboardMemory>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/telegram/status", get(get_telegram_status))
        .with_state(memory)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// GET /api/state - Latest engine snapshot
async fn get_state(State(memory): State<Arc<DashboardMemory>>) -> Json<ApiResponse<BotEngineState>> {
    Json(ApiResponse::success(memory.snapshot().await))
}

/// GET /api/telegram/status
async fn get_telegram_status(State(memory): State<Arc<DashboardMemory>>) -> Json<ApiResponse<TelegramStatus>> {
    Json(ApiResponse::success(TelegramStatus {
        connected: memory.telegram_connected(),
    }))
}
