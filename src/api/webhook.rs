//! Webhook 触发 API
//!
//! POST /payload: 校验签名 -> 检查分支 -> 单飞锁 -> 执行部署周期

use axum::{extract::State, routing::post, Router};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::PushEvent;
use crate::error::{ApiError, ApiResult};
use crate::middleware::SignedPayload;
use crate::services::deploy::DeployError;
use crate::state::AppState;

/// 创建 webhook 路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/payload", post(handle_payload))
}

/// 处理推送事件
///
/// POST /payload
/// 需要 `X-Hub-Signature-256`（production 且配置了密钥时）
async fn handle_payload(
    State(state): State<Arc<AppState>>,
    SignedPayload(body): SignedPayload,
) -> ApiResult<&'static str> {
    let event: PushEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON payload: {}", e)))?;

    if !event.targets(&state.config.tracked_ref()) {
        tracing::info!(git_ref = ?event.git_ref, "Ignoring push to untracked ref");
        return Ok("Not a main branch push");
    }

    let Some(guard) = state.try_begin_cycle() else {
        tracing::warn!("Rejected trigger, a deployment cycle is already running");
        return Err(ApiError::conflict("A deployment is already in progress"));
    };

    // 周期在独立任务中运行并持有锁，客户端断开不会中断它
    let cycle_id = Uuid::new_v4().to_string();
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        let _guard = guard;
        let report = task_state.cycle.run(cycle_id).await;
        task_state.set_last_report(report.clone()).await;
        report
    });

    let report = handle.await.map_err(|e| {
        let err = DeployError::Aborted(e.to_string());
        tracing::error!(error = %err, "Deployment task did not complete");
        ApiError::internal(format!("Deploy failed: {}", err))
    })?;

    if report.is_success() {
        Ok("Deployed!")
    } else {
        Err(ApiError::internal(format!(
            "Deploy failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::config::env::constants::MAX_PAYLOAD_BYTES;
    use crate::config::env::tests::test_config;
    use crate::domain::ServiceState;
    use crate::middleware::signature::tests::sign;
    use crate::services::deploy::reconcile::tests::FakeChannel;
    use crate::services::deploy::sync::tests::{repos, FakeFetcher};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const MAIN_PUSH: &str = r#"{"ref":"refs/heads/main","after":"abc123"}"#;

    fn two_services(fetcher: FakeFetcher) -> FakeFetcher {
        let (compose, secrets) = repos();
        fetcher
            .with_tree(
                &compose,
                &[
                    ("api/docker-compose.yml", "services: {}"),
                    ("web/docker-compose.yml", "services: {}"),
                    ("docs/README.md", "not a service"),
                ],
            )
            .with_tree(&secrets, &[("web/.env", "TOKEN=1")])
    }

    fn setup(fetcher: FakeFetcher) -> (tempfile::TempDir, Arc<AppState>, Arc<FakeFetcher>) {
        let root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher);
        let state = Arc::new(AppState::new(
            test_config(root.path()),
            fetcher.clone(),
            Arc::new(FakeChannel::new()),
        ));
        (root, state, fetcher)
    }

    fn signed(body: &str) -> Request<Body> {
        Request::post("/payload")
            .header("content-type", "application/json")
            .header("x-hub-signature-256", sign("topsecret", body.as_bytes()))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, String) {
        let response = api::router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_main_push_deploys_all_services() {
        let (_root, state, fetcher) = setup(two_services(FakeFetcher::new()));

        let (status, body) = send(&state, signed(MAIN_PUSH)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Deployed!");
        assert_eq!(fetcher.call_count(), 2);

        let report = state.last_report.read().await.clone().unwrap();
        assert!(report.is_success());
        let names: Vec<_> = report.outcomes.iter().map(|o| o.service.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
        assert_eq!(report.count(ServiceState::Running), 2);
        assert!(!state.is_cycle_running());
    }

    #[tokio::test]
    async fn test_non_main_push_has_no_side_effects() {
        let (root, state, fetcher) = setup(two_services(FakeFetcher::new()));

        let (status, body) = send(&state, signed(r#"{"ref":"refs/heads/dev"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Not a main branch push");
        assert_eq!(fetcher.call_count(), 0);
        assert!(!root.path().join("workspace").exists());
        assert!(state.last_report.read().await.is_none());
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected_before_sync() {
        let (_root, state, fetcher) = setup(two_services(FakeFetcher::new()));

        let request = Request::post("/payload")
            .header("x-hub-signature-256", sign("wrong", MAIN_PUSH.as_bytes()))
            .body(Body::from(MAIN_PUSH))
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = Request::post("/payload").body(Body::from(MAIN_PUSH)).unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let (_root, state, fetcher) = setup(FakeFetcher::new());

        let (status, _) = send(&state, signed("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, signed("[1, 2]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(fetcher.call_count(), 0);
    }

    fn padded_push(len: usize) -> String {
        format!(r#"{{"ref":"refs/heads/main","padding":"{}"}}"#, "x".repeat(len))
    }

    #[tokio::test]
    async fn test_large_signed_push_is_deployed() {
        let (_root, state, fetcher) = setup(two_services(FakeFetcher::new()));

        let (status, body) = send(&state, signed(&padded_push(3 * 1024 * 1024))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Deployed!");
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_oversized_push_is_payload_too_large() {
        let (_root, state, fetcher) = setup(two_services(FakeFetcher::new()));

        let (status, body) = send(&state, signed(&padded_push(MAX_PAYLOAD_BYTES))).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body.contains("payload_too_large"));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_busy_trigger_is_conflict() {
        let (_root, state, fetcher) = setup(two_services(FakeFetcher::new()));
        let _running = state.try_begin_cycle().unwrap();

        let (status, body) = send(&state, signed(MAIN_PUSH)).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("already in progress"));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_clone_failure_is_scrubbed_500() {
        let (_, secrets) = repos();
        let mut fetcher = two_services(FakeFetcher::new());
        fetcher.fail = Some(secrets.redacted());
        let (_root, state, _) = setup(fetcher);

        let (status, body) = send(&state, signed(MAIN_PUSH)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let message = json["message"].as_str().unwrap();
        assert!(message.starts_with("Deploy failed: failed to clone"));
        assert!(!body.contains("ghp_token"));
        assert!(!state.is_cycle_running());
    }

    #[tokio::test]
    async fn test_health_reports_last_cycle() {
        let (_root, state, _) = setup(two_services(FakeFetcher::new()));
        send(&state, signed(MAIN_PUSH)).await;

        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["service"], "webhook-deployer");
        assert_eq!(json["execution_mode"], "fake");
        assert_eq!(json["in_flight"], false);
        assert_eq!(json["last_report"]["status"], "success");
        assert_eq!(json["last_report"]["outcomes"][1]["state"], "running");
    }
}
