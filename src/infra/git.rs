//! Git 浅克隆
//!
//! 通过 `git` 命令行完成，凭据只出现在传给子进程的参数中

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::command::{CommandError, CommandRunner};
use crate::config::RepoSource;

/// 克隆失败
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// git 返回非零退出码，`message` 已脱敏
    #[error("{message}")]
    Failed { message: String },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// 获取仓库当前默认分支快照的能力
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    /// 把 `source` 的默认分支浅克隆到 `dest`（`dest` 不应已存在）
    async fn shallow_clone(&self, source: &RepoSource, dest: &Path) -> Result<(), FetchError>;
}

/// 调用 git 命令行
pub struct GitCli {
    program: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Clone arguments. The URL may carry credentials; never log this.
    fn clone_args(source: &RepoSource, dest: &Path) -> Vec<String> {
        vec![
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            "--quiet".to_string(),
            source.expose_url().to_string(),
            dest.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl RepoFetcher for GitCli {
    async fn shallow_clone(&self, source: &RepoSource, dest: &Path) -> Result<(), FetchError> {
        tracing::info!(repo = %source, dest = %dest.display(), "Cloning repository");

        let output = CommandRunner::run_simple(
            &self.program,
            Self::clone_args(source, dest),
            &[("GIT_TERMINAL_PROMPT", "0")],
            self.timeout,
        )
        .await?;

        if output.success {
            Ok(())
        } else {
            Err(FetchError::Failed {
                message: source.scrub(&output.summary()),
            })
        }
    }
}
