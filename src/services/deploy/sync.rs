//! Source sync
//!
//! Wipes the scratch workspace, shallow-clones the definitions and secrets
//! repositories into it, then mirrors both trees into the deployment root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{EnvConfig, RepoSource};
use crate::infra::fs::{remove_path, replace_dir};
use crate::infra::RepoFetcher;

use super::error::DeployError;

/// 同步完成后的目录
#[derive(Clone, Debug, PartialEq)]
pub struct SyncedWorkspace {
    /// `<deploy>/compose`
    pub compose_dir: PathBuf,
    /// `<deploy>/secrets`
    pub secrets_dir: PathBuf,
}

pub struct SourceSync {
    fetcher: Arc<dyn RepoFetcher>,
    compose_repo: RepoSource,
    secrets_repo: RepoSource,
    workspace_root: PathBuf,
    deploy_base: PathBuf,
}

impl SourceSync {
    pub fn new(config: &EnvConfig, fetcher: Arc<dyn RepoFetcher>) -> Self {
        Self {
            fetcher,
            compose_repo: config.compose_repo.clone(),
            secrets_repo: config.secrets_repo.clone(),
            workspace_root: config.workspace_root.clone(),
            deploy_base: config.deploy_base.clone(),
        }
    }

    /// Full replace, never an incremental pull. Any failure aborts the cycle.
    pub async fn sync(&self) -> Result<SyncedWorkspace, DeployError> {
        self.reset_workspace().await?;

        let scratch_compose = self.workspace_root.join("compose");
        let scratch_secrets = self.workspace_root.join("secrets");
        self.clone_into(&self.compose_repo, &scratch_compose).await?;
        self.clone_into(&self.secrets_repo, &scratch_secrets).await?;

        let synced = SyncedWorkspace {
            compose_dir: self.deploy_base.join("compose"),
            secrets_dir: self.deploy_base.join("secrets"),
        };
        mirror(&scratch_compose, &synced.compose_dir).await?;
        mirror(&scratch_secrets, &synced.secrets_dir).await?;

        tracing::info!(
            compose = %synced.compose_dir.display(),
            secrets = %synced.secrets_dir.display(),
            "Sources synced"
        );
        Ok(synced)
    }

    async fn reset_workspace(&self) -> Result<(), DeployError> {
        let root = self.workspace_root.clone();
        tracing::info!(workspace = %root.display(), "Resetting workspace");

        let result = tokio::task::spawn_blocking({
            let root = root.clone();
            move || {
                remove_path(&root)?;
                std::fs::create_dir_all(&root)
            }
        })
        .await
        .map_err(|e| DeployError::Aborted(e.to_string()))?;

        result.map_err(|source| DeployError::Workspace { path: root, source })
    }

    async fn clone_into(&self, repo: &RepoSource, dest: &Path) -> Result<(), DeployError> {
        self.fetcher
            .shallow_clone(repo, dest)
            .await
            .map_err(|e| DeployError::Clone {
                repo: repo.redacted(),
                message: repo.scrub(&e.to_string()),
            })
    }
}

/// 用新克隆的内容替换部署目录
async fn mirror(src: &Path, target: &Path) -> Result<(), DeployError> {
    let (src, target) = (src.to_path_buf(), target.to_path_buf());
    let context = format!("failed to replace {}", target.display());
    tracing::info!(target = %target.display(), "Replacing deployment directory");

    tokio::task::spawn_blocking(move || replace_dir(&target, &src))
        .await
        .map_err(|e| DeployError::Aborted(e.to_string()))?
        .map_err(|source| DeployError::io(context, source))
}
