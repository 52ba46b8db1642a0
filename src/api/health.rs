//! 健康检查 API
//!
//! GET /health 返回服务信息与最近一次部署报告

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::domain::DeploymentReport;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    started_at: String,
    timestamp: String,
    environment: String,
    execution_mode: &'static str,
    /// 是否有周期正在运行
    in_flight: bool,
    last_report: Option<DeploymentReport>,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

/// 健康检查
///
/// GET /health
/// 无需认证
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last_report = state.last_report.read().await.clone();

    Json(HealthResponse {
        status: "ok",
        service: "webhook-deployer",
        version: VERSION,
        started_at: state.started_at.to_rfc3339(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        environment: state.config.environment.clone(),
        execution_mode: state.execution_mode,
        in_flight: state.is_cycle_running(),
        last_report,
    })
}
