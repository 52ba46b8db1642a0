//! 执行通道
//!
//! 抽象"在容器实际运行的地方执行命令"：
//! - `LocalChannel`: 本机子进程
//! - `SshChannel`: 通过 ssh/scp 在远程主机执行，命令按 token 逐个转义

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::command::{CommandError, CommandOutput, CommandRunner};
use super::fs::copy_dir_all;
use crate::config::RemoteTarget;
use crate::domain::ServiceDefinition;

/// 目录准备/文件传输错误
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// 命令以非零码退出
    #[error("{0}")]
    Failed(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// 执行通道
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    /// 通道名称（local / remote）
    fn name(&self) -> &'static str;

    /// 服务在执行目标上的目录
    fn target_dir(&self, service: &ServiceDefinition) -> String;

    /// 在执行目标上运行命令；非零退出码以 `success == false` 返回
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError>;

    /// 确保执行目标上的目录存在
    async fn ensure_directory(&self, path: &str) -> Result<(), ChannelError>;

    /// 把本地目录的顶层条目复制到执行目标上的 `target_dir`
    async fn transfer(&self, local_dir: &Path, target_dir: &str) -> Result<(), ChannelError>;
}

/// 本机执行
pub struct LocalChannel {
    timeout: Duration,
}

impl LocalChannel {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ExecutionChannel for LocalChannel {
    fn name(&self) -> &'static str {
        "local"
    }

    fn target_dir(&self, service: &ServiceDefinition) -> String {
        service.definition_path.to_string_lossy().into_owned()
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        debug!(program = %program, args = ?args, "Running local command");
        CommandRunner::run_simple(program, args, &[], self.timeout).await
    }

    async fn ensure_directory(&self, path: &str) -> Result<(), ChannelError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| ChannelError::Io {
                context: format!("failed to create {}", path),
                source,
            })
    }

    async fn transfer(&self, local_dir: &Path, target_dir: &str) -> Result<(), ChannelError> {
        let target = PathBuf::from(target_dir);
        if same_path(local_dir, &target) {
            // 定义已经在部署目录中
            return Ok(());
        }

        let src = local_dir.to_path_buf();
        let context = format!("failed to copy {} to {}", src.display(), target.display());
        tokio::task::spawn_blocking(move || copy_dir_all(&src, &target))
            .await
            .map_err(|e| ChannelError::Failed(format!("copy task aborted: {}", e)))?
            .map_err(|source| ChannelError::Io { context, source })
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// 通过 ssh 在远程主机执行
pub struct SshChannel {
    target: RemoteTarget,
    timeout: Duration,
}

impl SshChannel {
    pub fn new(target: RemoteTarget, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// ssh/scp 共用的认证参数
    fn auth_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.target.identity_file.to_string_lossy().into_owned(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ]
    }

    /// `ssh -i <key> -o BatchMode=yes -- user@host <quoted tokens...>`
    fn ssh_args(&self, program: &str, args: &[String]) -> Vec<String> {
        let mut ssh_args = self.auth_args();
        ssh_args.push("--".to_string());
        ssh_args.push(self.target.destination());
        ssh_args.push(shell_quote(program));
        ssh_args.extend(args.iter().map(|a| shell_quote(a)));
        ssh_args
    }

    /// `scp -i <key> -o BatchMode=yes -r -p -- <entries...> user@host:<dir>`
    fn scp_args(&self, entries: &[PathBuf], target_dir: &str) -> Vec<String> {
        let mut scp_args = self.auth_args();
        scp_args.extend(["-r".to_string(), "-p".to_string(), "--".to_string()]);
        scp_args.extend(entries.iter().map(|p| p.to_string_lossy().into_owned()));
        scp_args.push(format!("{}:{}", self.target.destination(), target_dir));
        scp_args
    }
}

#[async_trait]
impl ExecutionChannel for SshChannel {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn target_dir(&self, service: &ServiceDefinition) -> String {
        format!(
            "{}/{}",
            self.target.compose_root.trim_end_matches('/'),
            service.name
        )
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        let ssh_args = self.ssh_args(program, args);
        debug!(
            host = %self.target.host,
            command = %ssh_args[6..].join(" "),
            "Running remote command"
        );
        CommandRunner::run_simple("ssh", &ssh_args, &[], self.timeout).await
    }

    async fn ensure_directory(&self, path: &str) -> Result<(), ChannelError> {
        let output = self
            .run("mkdir", &["-p".to_string(), path.to_string()])
            .await?;
        if output.success {
            Ok(())
        } else {
            Err(ChannelError::Failed(format!(
                "mkdir -p {} failed: {}",
                path,
                output.summary()
            )))
        }
    }

    async fn transfer(&self, local_dir: &Path, target_dir: &str) -> Result<(), ChannelError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(local_dir)
            .await
            .map_err(|source| ChannelError::Io {
                context: format!("failed to read {}", local_dir.display()),
                source,
            })?;
        while let Some(entry) = dir.next_entry().await.map_err(|source| ChannelError::Io {
            context: format!("failed to read {}", local_dir.display()),
            source,
        })? {
            entries.push(entry.path());
        }
        if entries.is_empty() {
            return Ok(());
        }
        entries.sort();

        let scp_args = self.scp_args(&entries, target_dir);
        let output = CommandRunner::run_simple("scp", &scp_args, &[], self.timeout).await?;
        if output.success {
            Ok(())
        } else {
            Err(ChannelError::Failed(format!(
                "scp to {} failed: {}",
                target_dir,
                output.summary()
            )))
        }
    }
}

/// 单个 token 的 POSIX shell 转义
///
/// 仅含安全字符时原样返回，否则用单引号包裹
pub fn shell_quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', "'\\''"))
    }
}
