//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod health;
pub mod webhook;

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::env::constants::MAX_PAYLOAD_BYTES;
use crate::state::AppState;

/// 构建完整的 API 路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .merge(health::router())
        // Webhook
        .merge(webhook::router())
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
