//! 状态协调
//!
//! 发现可部署服务，逐个下发密钥、同步到执行目标并驱动 compose。
//! 拉取失败只跳过该服务；其余运行时失败终止整个周期。

use std::path::Path;
use std::sync::Arc;

use crate::config::env::constants::MANIFEST_FILE;
use crate::config::RestartPolicy;
use crate::domain::{DeploymentReport, SecretBundle, ServiceDefinition, ServiceOutcome, ServiceState};
use crate::infra::{ChannelError, ExecutionChannel};

use super::compose::{ComposeAction, ComposeCommand};
use super::error::DeployError;
use super::secrets;
use super::sync::SyncedWorkspace;

pub struct Reconciler {
    channel: Arc<dyn ExecutionChannel>,
    compose: ComposeCommand,
    restart_policy: RestartPolicy,
}

impl Reconciler {
    pub fn new(
        channel: Arc<dyn ExecutionChannel>,
        compose: ComposeCommand,
        restart_policy: RestartPolicy,
    ) -> Self {
        Self {
            channel,
            compose,
            restart_policy,
        }
    }

    /// 按名称字典序逐个部署所有服务，结果写入 `report`
    ///
    /// 返回 Err 时，之前的服务结果已记录，之后的服务未尝试
    pub async fn reconcile(
        &self,
        synced: &SyncedWorkspace,
        report: &mut DeploymentReport,
    ) -> Result<(), DeployError> {
        let services = discover(&synced.compose_dir).await?;
        tracing::info!(
            count = services.len(),
            services = ?services.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Found services"
        );

        for service in &services {
            let mut outcome = ServiceOutcome::pending(&service.name);
            let result = self
                .deploy_service(service, &synced.secrets_dir, &mut outcome)
                .await;
            if let Err(ref e) = result {
                outcome.message = Some(e.to_string());
            }
            report.record(outcome);
            result?;
        }

        Ok(())
    }

    async fn deploy_service(
        &self,
        service: &ServiceDefinition,
        secrets_dir: &Path,
        outcome: &mut ServiceOutcome,
    ) -> Result<(), DeployError> {
        tracing::info!(service = %service.name, channel = self.channel.name(), "Preparing service");

        // 1. secrets
        outcome.secrets =
            Some(secrets::provision(&SecretBundle::for_service(service, secrets_dir)).await?);

        // 2. definition + secrets onto the target
        let target_dir = self.channel.target_dir(service);
        self.stage(service, &target_dir).await?;
        let manifest = format!("{}/{}", target_dir.trim_end_matches('/'), MANIFEST_FILE);

        // 3. pull（失败只跳过本服务）
        if let Err(reason) = self.pull(&manifest).await {
            tracing::warn!(
                service = %service.name,
                reason = %reason,
                "Failed to pull images, it may be inaccessible or private. Skipping"
            );
            outcome.advance(ServiceState::PullFailed);
            outcome.advance(ServiceState::Skipped);
            outcome.message = Some(reason);
            return Ok(());
        }
        outcome.advance(ServiceState::Pulled);

        // 4. stop + start
        if self.restart_policy == RestartPolicy::DownUp {
            self.run_required(service, &manifest, ComposeAction::Down)
                .await?;
            tracing::info!(service = %service.name, "Stopped");
        }
        self.run_required(service, &manifest, ComposeAction::Up)
            .await?;
        outcome.advance(ServiceState::Running);
        tracing::info!(service = %service.name, "Started");

        Ok(())
    }

    async fn stage(&self, service: &ServiceDefinition, target_dir: &str) -> Result<(), DeployError> {
        let staging = |source: ChannelError| DeployError::Staging {
            service: service.name.clone(),
            source,
        };
        self.channel
            .ensure_directory(target_dir)
            .await
            .map_err(staging)?;
        self.channel
            .transfer(&service.definition_path, target_dir)
            .await
            .map_err(staging)
    }

    /// 拉取镜像，失败时返回原因
    async fn pull(&self, manifest: &str) -> Result<(), String> {
        let args = self.compose.args(manifest, ComposeAction::Pull);
        match self.channel.run(self.compose.program(), &args).await {
            Ok(output) if output.success => Ok(()),
            Ok(output) => Err(output.summary()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn run_required(
        &self,
        service: &ServiceDefinition,
        manifest: &str,
        action: ComposeAction,
    ) -> Result<(), DeployError> {
        let args = self.compose.args(manifest, action);
        let output = self
            .channel
            .run(self.compose.program(), &args)
            .await
            .map_err(|source| DeployError::Channel {
                service: service.name.clone(),
                step: action.step(),
                source,
            })?;

        if output.success {
            Ok(())
        } else {
            Err(DeployError::Command {
                service: service.name.clone(),
                step: action.step(),
                detail: output.summary(),
            })
        }
    }
}

/// 发现可部署服务
///
/// 仅收录直接包含 compose 清单的子目录，按名称字典序返回
pub async fn discover(compose_dir: &Path) -> Result<Vec<ServiceDefinition>, DeployError> {
    let read_err = |e: std::io::Error| {
        DeployError::io(format!("failed to list {}", compose_dir.display()), e)
    };
    let mut entries = tokio::fs::read_dir(compose_dir).await.map_err(read_err)?;

    let mut services = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                let service = ServiceDefinition::new(name, path);
                if service.has_manifest() {
                    services.push(service);
                }
            }
            Err(name) => {
                tracing::warn!(name = ?name, "Skipping service directory with non UTF-8 name")
            }
        }
    }

    services.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(services)
}
