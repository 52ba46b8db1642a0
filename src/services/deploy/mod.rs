//! 部署周期
//!
//! 一个周期分两个阶段：源同步（克隆并镜像定义与密钥仓库），
//! 然后逐个协调服务。任一阶段的致命错误都会终止周期

pub mod compose;
pub mod error;
pub mod reconcile;
pub mod secrets;
pub mod sync;

use std::sync::Arc;

use crate::config::EnvConfig;
use crate::domain::deploy::{DeployStatus, DeploymentReport, ServiceState, StageStatus};
use crate::infra::{ExecutionChannel, RepoFetcher};

pub use compose::{ComposeAction, ComposeCommand};
pub use error::DeployError;
pub use reconcile::Reconciler;
pub use sync::{SourceSync, SyncedWorkspace};

const STAGE_SOURCE_SYNC: &str = "source_sync";
const STAGE_RECONCILE: &str = "reconcile";

/// 可重复执行的部署周期
pub struct DeployCycle {
    sync: SourceSync,
    reconciler: Reconciler,
}

impl DeployCycle {
    pub fn new(
        config: &EnvConfig,
        fetcher: Arc<dyn RepoFetcher>,
        channel: Arc<dyn ExecutionChannel>,
    ) -> Self {
        Self {
            sync: SourceSync::new(config, fetcher),
            reconciler: Reconciler::new(
                channel,
                ComposeCommand::new(config.docker.clone()),
                config.restart_policy,
            ),
        }
    }

    /// 执行一个完整周期
    ///
    /// 不返回错误，失败原因记录在报告的 `error` 中
    pub async fn run(&self, cycle_id: impl Into<String>) -> DeploymentReport {
        let mut report = DeploymentReport::new(cycle_id);
        tracing::info!(cycle_id = %report.cycle_id, "Deployment cycle started");

        let result = self.run_stages(&mut report).await;
        let (status, error) = match result {
            Ok(()) => (DeployStatus::Success, None),
            Err(e) => {
                tracing::error!(cycle_id = %report.cycle_id, error = %e, "Deployment cycle failed");
                (DeployStatus::Failed, Some(e.to_string()))
            }
        };
        report.complete(status, error);

        log_summary(&report);
        report
    }

    async fn run_stages(&self, report: &mut DeploymentReport) -> Result<(), DeployError> {
        start_stage(report, STAGE_SOURCE_SYNC);
        let synced = match self.sync.sync().await {
            Ok(synced) => {
                finish_stage(report, STAGE_SOURCE_SYNC, true, None);
                synced
            }
            Err(e) => {
                finish_stage(report, STAGE_SOURCE_SYNC, false, Some(e.to_string()));
                if let Some(stage) = report.stage_mut(STAGE_RECONCILE) {
                    stage.skip(Some("source sync failed".to_string()));
                }
                return Err(e);
            }
        };

        start_stage(report, STAGE_RECONCILE);
        let result = self.reconciler.reconcile(&synced, report).await;
        let message = match &result {
            Ok(()) => Some(format!(
                "{} running, {} skipped",
                report.count(ServiceState::Running),
                report.count(ServiceState::Skipped)
            )),
            Err(e) => Some(e.to_string()),
        };
        finish_stage(report, STAGE_RECONCILE, result.is_ok(), message);
        result
    }
}

fn start_stage(report: &mut DeploymentReport, name: &str) {
    if let Some(stage) = report.stage_mut(name) {
        stage.start();
    }
}

fn finish_stage(report: &mut DeploymentReport, name: &str, success: bool, message: Option<String>) {
    if let Some(stage) = report.stage_mut(name) {
        stage.finish(success, message);
    }
}

fn log_summary(report: &DeploymentReport) {
    for stage in &report.stages {
        let duration = stage
            .duration_ms
            .map(|d| format!("{}ms", d))
            .unwrap_or_else(|| "-".to_string());
        let status_icon = match stage.status {
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        };
        tracing::info!(
            cycle_id = %report.cycle_id,
            "{} {} ({})",
            status_icon,
            stage.display_name,
            duration
        );
    }

    tracing::info!(
        cycle_id = %report.cycle_id,
        status = report.status.as_str(),
        running = report.count(ServiceState::Running),
        skipped = report.count(ServiceState::Skipped),
        "Deployment cycle finished"
    );
}
