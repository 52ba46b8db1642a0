//! 部署周期相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::service::SecretProvision;

/// 部署周期状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
        }
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 周期阶段信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployStage {
    /// 阶段标识 (e.g., "source_sync", "reconcile")
    pub name: String,
    /// 显示名称
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl DeployStage {
    /// 创建新的待执行阶段
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 单个服务在一个周期内的状态
///
/// 成功路径 `Pending -> Pulled -> Running`，失败路径 `Pending -> PullFailed -> Skipped`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Pending,
    Pulled,
    Running,
    PullFailed,
    Skipped,
}

impl ServiceState {
    /// 是否允许转换到 `next`
    pub fn can_advance_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Pending, Pulled) | (Pulled, Running) | (Pending, PullFailed) | (PullFailed, Skipped)
        )
    }
}

/// 单个服务的部署结果
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServiceOutcome {
    pub service: String,
    pub state: ServiceState,
    /// `.env` 下发结果
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<SecretProvision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceOutcome {
    pub fn pending(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            state: ServiceState::Pending,
            secrets: None,
            message: None,
        }
    }

    /// 推进状态，不合法的转换返回 false 且不修改状态
    pub fn advance(&mut self, next: ServiceState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

/// 一个部署周期的汇总报告
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentReport {
    pub cycle_id: String,
    pub status: DeployStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<DeployStage>,
    pub outcomes: Vec<ServiceOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentReport {
    /// 创建新报告
    pub fn new(cycle_id: impl Into<String>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            status: DeployStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            stages: vec![
                DeployStage::new("source_sync", "Source Sync"),
                DeployStage::new("reconcile", "Reconcile"),
            ],
            outcomes: Vec::new(),
            error: None,
        }
    }

    /// 按名称获取阶段
    pub fn stage_mut(&mut self, name: &str) -> Option<&mut DeployStage> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn record(&mut self, outcome: ServiceOutcome) {
        self.outcomes.push(outcome);
    }

    /// 设置周期完成
    pub fn complete(&mut self, status: DeployStatus, error: Option<String>) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.error = error;
    }

    pub fn count(&self, state: ServiceState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn is_success(&self) -> bool {
        self.status == DeployStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_status_as_str() {
        assert_eq!(DeployStatus::Running.as_str(), "running");
        assert_eq!(DeployStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_deploy_stage_lifecycle() {
        let mut stage = DeployStage::new("test", "Test Stage");
        assert_eq!(stage.status, StageStatus::Pending);

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());

        stage.finish(true, Some("Done".to_string()));
        assert_eq!(stage.status, StageStatus::Success);
        assert!(stage.finished_at.is_some());
        assert!(stage.duration_ms.is_some());
    }

    #[test]
    fn test_service_success_path() {
        let mut outcome = ServiceOutcome::pending("web");
        assert!(outcome.advance(ServiceState::Pulled));
        assert!(outcome.advance(ServiceState::Running));
        assert_eq!(outcome.state, ServiceState::Running);
    }

    #[test]
    fn test_service_failure_path() {
        let mut outcome = ServiceOutcome::pending("web");
        assert!(outcome.advance(ServiceState::PullFailed));
        assert!(!outcome.advance(ServiceState::Running));
        assert!(outcome.advance(ServiceState::Skipped));
        assert_eq!(outcome.state, ServiceState::Skipped);
    }

    #[test]
    fn test_service_rejects_skipping_pull() {
        let mut outcome = ServiceOutcome::pending("web");
        assert!(!outcome.advance(ServiceState::Running));
        assert_eq!(outcome.state, ServiceState::Pending);
    }

    #[test]
    fn test_report_counts() {
        let mut report = DeploymentReport::new("cycle");
        let mut a = ServiceOutcome::pending("a");
        a.advance(ServiceState::Pulled);
        a.advance(ServiceState::Running);
        let mut b = ServiceOutcome::pending("b");
        b.advance(ServiceState::PullFailed);
        b.advance(ServiceState::Skipped);
        report.record(a);
        report.record(b);
        report.complete(DeployStatus::Success, None);

        assert_eq!(report.count(ServiceState::Running), 1);
        assert_eq!(report.count(ServiceState::Skipped), 1);
        assert!(report.is_success());
        assert!(report.finished_at.is_some());
    }
}
