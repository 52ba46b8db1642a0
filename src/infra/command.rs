//! 命令执行器
//!
//! 提供统一的子进程执行接口，支持：
//! - 超时控制（超时后子进程被 kill）
//! - stdout/stderr 分离捕获
//! - 结构化参数，不经过 shell

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 命令超时
    Timeout(Duration),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout(d) => write!(f, "Command timed out after {}s", d.as_secs()),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) => Some(e),
            CommandError::Timeout(_) => None,
        }
    }
}

/// 命令执行结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    /// 退出码是否为 0
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// 用于错误信息的简短描述，优先 stderr
    pub fn summary(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        match self.code {
            Some(code) if text.is_empty() => format!("exit code {}", code),
            Some(code) => format!("exit code {}: {}", code, text),
            None if text.is_empty() => "terminated by signal".to_string(),
            None => format!("terminated by signal: {}", text),
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl CommandRunner {
    /// 执行命令并捕获输出
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数
    /// * `envs` - 额外环境变量
    /// * `timeout` - 超时时间
    pub async fn run_simple<I, S>(
        program: &str,
        args: I,
        envs: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            command.env(key, value);
        }

        debug!(program = %program, "Spawning command");
        let child = command.output();

        match tokio::time::timeout(timeout, child).await {
            Ok(result) => result.map(CommandOutput::from).map_err(CommandError::SpawnFailed),
            Err(_) => {
                // output future 被丢弃时 kill_on_drop 会结束子进程
                error!(program = %program, "Command timed out after {:?}", timeout);
                Err(CommandError::Timeout(timeout))
            }
        }
    }
}
