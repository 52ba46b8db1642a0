//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

/// 全局 shutdown token，用于优雅关闭 HTTP 服务
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN
        .get_or_init(CancellationToken::new)
        .clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

use crate::config::{EnvConfig, ExecutionMode};
use crate::domain::DeploymentReport;
use crate::infra::{ExecutionChannel, GitCli, LocalChannel, RepoFetcher, SshChannel};
use crate::services::deploy::DeployCycle;

/// 应用状态
pub struct AppState {
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 执行通道名称 (local / remote)
    pub execution_mode: &'static str,
    /// 部署周期
    pub cycle: Arc<DeployCycle>,
    /// 同一时刻只允许一个周期
    cycle_lock: Arc<Mutex<()>>,
    /// 最近一次完成的周期
    pub last_report: RwLock<Option<DeploymentReport>>,
}

impl AppState {
    /// 根据配置创建真实的 git / 执行通道
    pub fn from_config(config: EnvConfig) -> Self {
        let fetcher: Arc<dyn RepoFetcher> = Arc::new(GitCli::new(config.clone_timeout));
        let channel: Arc<dyn ExecutionChannel> = match &config.execution {
            ExecutionMode::Local => Arc::new(LocalChannel::new(config.command_timeout)),
            ExecutionMode::Remote(target) => {
                Arc::new(SshChannel::new(target.clone(), config.command_timeout))
            }
        };
        Self::new(config, fetcher, channel)
    }

    pub fn new(
        config: EnvConfig,
        fetcher: Arc<dyn RepoFetcher>,
        channel: Arc<dyn ExecutionChannel>,
    ) -> Self {
        let execution_mode = channel.name();
        let cycle = Arc::new(DeployCycle::new(&config, fetcher, channel));
        Self {
            config,
            started_at: Utc::now(),
            execution_mode,
            cycle,
            cycle_lock: Arc::new(Mutex::new(())),
            last_report: RwLock::new(None),
        }
    }

    /// 尝试占用周期锁，已有周期运行时返回 None
    pub fn try_begin_cycle(&self) -> Option<OwnedMutexGuard<()>> {
        self.cycle_lock.clone().try_lock_owned().ok()
    }

    /// 是否有周期正在运行
    pub fn is_cycle_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    pub async fn set_last_report(&self, report: DeploymentReport) {
        *self.last_report.write().await = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::tests::test_config;
    use crate::services::deploy::reconcile::tests::FakeChannel;
    use crate::services::deploy::sync::tests::FakeFetcher;

    #[test]
    fn test_cycle_lock_is_exclusive() {
        let root = tempfile::tempdir().unwrap();
        let state = AppState::new(
            test_config(root.path()),
            Arc::new(FakeFetcher::new()),
            Arc::new(FakeChannel::new()),
        );
        assert_eq!(state.execution_mode, "fake");
        assert!(!state.is_cycle_running());

        let guard = state.try_begin_cycle().unwrap();
        assert!(state.is_cycle_running());
        assert!(state.try_begin_cycle().is_none());

        drop(guard);
        assert!(!state.is_cycle_running());
        assert!(state.try_begin_cycle().is_some());
    }
}
